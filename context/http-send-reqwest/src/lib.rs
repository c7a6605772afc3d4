//! Reqwest based transport for the EveryTrail SDK.
//!
//! `ReqwestHttpSend` implements [`HttpSend`] on top of a [`reqwest::Client`]:
//!
//! - streamed bodies are handed to reqwest as is, so upload progress follows
//!   what the connection actually pulls,
//! - the per-call timeout maps to [`reqwest::RequestBuilder::timeout`],
//! - dropping the future aborts the exchange.
//!
//! ## Example
//!
//! ```no_run
//! use everytrail_core::Context;
//! use everytrail_http_send_reqwest::ReqwestHttpSend;
//!
//! let ctx = Context::new().with_http_send(ReqwestHttpSend::default());
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use everytrail_core::{Body, Error, HttpSend, Result};
use http::header::CONTENT_LENGTH;
use http_body_util::BodyExt;
use reqwest::Client;
use std::time::Duration;

/// Reqwest-based implementation of the `HttpSend` trait.
#[derive(Debug, Default, Clone)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(
        &self,
        req: http::Request<Body>,
        timeout: Option<Duration>,
    ) -> Result<http::Response<Bytes>> {
        let (parts, body) = req.into_parts();

        let mut builder = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);
        builder = match body {
            Body::Empty => builder,
            Body::Bytes(bs) => builder.body(bs),
            Body::Stream { stream, length } => builder
                .header(CONTENT_LENGTH, length)
                .body(reqwest::Body::wrap_stream(stream)),
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let resp: http::Response<_> = builder.send().await.map_err(from_reqwest_error)?.into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(from_reqwest_error)?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

fn from_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout("request timed out").with_source(err)
    } else {
        Error::connection(format!("failed to send request: {err}")).with_source(err)
    }
}
