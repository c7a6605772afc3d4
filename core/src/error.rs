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

use std::fmt;
use thiserror::Error;

/// The error type for EveryTrail operations
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    code: Option<i64>,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transport could not complete the exchange.
    Connection,

    /// The request did not finish within its timeout.
    Timeout,

    /// The response body is malformed or misses expected fields.
    FaultyResponse,

    /// Bad credentials, missing identity or failed user id resolution.
    Authentication,

    /// The service answered with a structured API error code.
    Service,

    /// Configuration error (missing key or secret, invalid endpoint)
    ConfigInvalid,

    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Numeric code of this kind.
    ///
    /// Service errors carry the service's own code instead, see [`Error::code`].
    pub fn code(&self) -> i64 {
        match self {
            ErrorKind::Connection => -1,
            ErrorKind::Timeout => -2,
            ErrorKind::FaultyResponse => -3,
            ErrorKind::Authentication => -4,
            ErrorKind::ConfigInvalid => -5,
            ErrorKind::Service | ErrorKind::Unknown => -100,
        }
    }
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the code returned by the service.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the machine readable code.
    ///
    /// Returns the code reported by the service if there is one, the code of
    /// the error kind otherwise.
    pub fn code(&self) -> i64 {
        self.code.unwrap_or_else(|| self.kind.code())
    }

    /// Check if this error was raised by the transport.
    pub fn is_transport_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection | ErrorKind::Timeout)
    }
}

// Convenience constructors
impl Error {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a faulty response error
    pub fn faulty_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FaultyResponse, message)
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Create a service error carrying the code returned by the service
    pub fn service(code: i64, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Service, message).with_code(code)
    }

    /// Create a config invalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create an unknown error
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "connection error"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::FaultyResponse => write!(f, "faulty response"),
            ErrorKind::Authentication => write!(f, "authentication error"),
            ErrorKind::Service => write!(f, "service error"),
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::Unknown => write!(f, "unknown error"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unknown(err.to_string()).with_source(err)
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::unknown(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::unknown(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::config_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::faulty_response(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::unknown(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::connection("boom").code(), -1);
        assert_eq!(Error::timeout("slow").code(), -2);
        assert_eq!(Error::faulty_response("xml").code(), -3);
        assert_eq!(Error::authentication("who").code(), -4);
        assert_eq!(Error::unknown("?").code(), -100);
        assert_eq!(Error::service(12, "bad trip").code(), 12);
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::connection("reset").is_transport_error());
        assert!(Error::timeout("slow").is_transport_error());
        assert!(!Error::service(1, "denied").is_transport_error());
        assert!(!Error::authentication("denied").is_transport_error());
    }

    #[test]
    fn test_display_uses_message() {
        let err = Error::faulty_response("unexpected end of document");
        assert_eq!(err.to_string(), "unexpected end of document");
        assert_eq!(err.kind().to_string(), "faulty response");
    }
}
