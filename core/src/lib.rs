//! Core components for the EveryTrail SDK.
//!
//! This crate provides the foundational types and traits shared by the
//! EveryTrail client and its transports.
//!
//! ## Overview
//!
//! - **Context**: A container that holds implementations for HTTP sending and environment access
//! - **HttpSend**: The transport contract, with per-call timeouts, streamed bodies and cancellation by drop
//! - **Error**: One error type with a machine readable [`ErrorKind`] and code
//!
//! ## Example
//!
//! ```no_run
//! use everytrail_core::{Body, Context, HttpSend, Result};
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct CannedHttpSend;
//!
//! #[async_trait]
//! impl HttpSend for CannedHttpSend {
//!     async fn http_send(
//!         &self,
//!         _req: http::Request<Body>,
//!         _timeout: Option<Duration>,
//!     ) -> Result<http::Response<Bytes>> {
//!         Ok(http::Response::new(Bytes::from_static(b"<ok/>")))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let ctx = Context::new().with_http_send(CannedHttpSend);
//! let req = http::Request::get("http://www.everytrail.com/api").body(Body::Empty)?;
//! let resp = ctx.http_send(req, Some(Duration::from_secs(10))).await?;
//! assert_eq!(resp.body().as_ref(), b"<ok/>");
//! # Ok(())
//! # }
//! ```
//!
//! ## Utilities
//!
//! - [`hash`]: MD5 and base64 helpers
//! - [`utils`]: Escaping, UUIDs and data redaction

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod utils;

mod context;
pub use context::{Context, Env, NoopEnv, NoopHttpSend, OsEnv, StaticEnv};
mod error;
pub use error::{Error, ErrorKind, Result};
mod http;
pub use self::http::{Body, HttpSend};
