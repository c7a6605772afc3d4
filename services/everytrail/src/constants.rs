// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::time::Duration;

// Env values used by the EveryTrail client.
pub const EVERYTRAIL_API_KEY: &str = "EVERYTRAIL_API_KEY";
pub const EVERYTRAIL_API_SECRET: &str = "EVERYTRAIL_API_SECRET";
pub const EVERYTRAIL_USERNAME: &str = "EVERYTRAIL_USERNAME";
pub const EVERYTRAIL_PASSWORD: &str = "EVERYTRAIL_PASSWORD";
pub const EVERYTRAIL_USER_ID: &str = "EVERYTRAIL_USER_ID";
pub const EVERYTRAIL_API_ENDPOINT: &str = "EVERYTRAIL_API_ENDPOINT";
pub const EVERYTRAIL_AUTH_ENDPOINT: &str = "EVERYTRAIL_AUTH_ENDPOINT";

// Default endpoints.
pub const DEFAULT_API_ENDPOINT: &str = "http://www.everytrail.com/api";
pub const DEFAULT_AUTH_ENDPOINT: &str = "http://www.everytrail.com/api/user/login";

// Arguments injected while signing.
pub const ARG_API_KEY: &str = "api_key";
pub const ARG_USER_ID: &str = "user_id";
pub const ARG_SIGNATURE: &str = "sig";

// Upload.
pub const UPLOAD_DOMAIN: &str = "photo";
pub const UPLOAD_METHOD: &str = "upload";
pub const UPLOAD_FILE_FIELD: &str = "photo";
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
