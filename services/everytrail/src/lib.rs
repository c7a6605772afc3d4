//! EveryTrail API client
//!
//! - [`ApiContext`] signs arguments and resolves the user id of the configured user.
//! - [`ApiRequest`] runs one call (GET, POST or JPEG upload) and reports its
//!   outcome to a [`RequestDelegate`], or returns it directly.
//!
//! ## Example
//!
//! ```no_run
//! use everytrail::{ApiContext, ApiRequest, Arguments, Config};
//! use everytrail_core::{Context, OsEnv};
//! use everytrail_http_send_reqwest::ReqwestHttpSend;
//! use std::sync::Arc;
//!
//! # async fn example() -> everytrail_core::Result<()> {
//! let ctx = Context::new()
//!     .with_http_send(ReqwestHttpSend::default())
//!     .with_env(OsEnv);
//! let config = Config::from_env(&ctx);
//! let api = Arc::new(ApiContext::from_config(ctx, config)?);
//!
//! let resp = ApiRequest::new(api)
//!     .get("trips", "user", Arguments::new().with("limit", 10u64), true)
//!     .await?;
//! println!("{:?}", resp.get("trips"));
//! # Ok(())
//! # }
//! ```

mod api_context;
pub use api_context::ApiContext;

mod arguments;
pub use arguments::{Arguments, Value};

mod auth;

mod config;
pub use config::Config;

mod constants;
pub use constants::DEFAULT_REQUEST_TIMEOUT;

mod delegate;
pub use delegate::{RequestDelegate, UserIdConsumer};

mod multipart;

mod photo;
pub use photo::{photo_source_url, PhotoSize, FULL_SIZE, THUMBNAIL_SIZE};

mod request;
pub use request::{ApiRequest, RequestState};

mod response;
pub use response::{ParseResponse, Response, XmlParser, TEXT_KEY};

mod sign;
