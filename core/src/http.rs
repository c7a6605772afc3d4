use crate::Result;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt::{Debug, Formatter};
use std::io;
use std::time::Duration;

/// Body of a request handed to [`HttpSend`].
#[derive(Default)]
pub enum Body {
    /// No body at all.
    #[default]
    Empty,
    /// A body held in memory.
    Bytes(Bytes),
    /// A body pulled chunk by chunk, used for uploads.
    Stream {
        /// Chunks of the body.
        stream: BoxStream<'static, io::Result<Bytes>>,
        /// Total length in bytes, sent as `Content-Length`.
        length: u64,
    },
}

impl Body {
    /// Length of the body in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bs) => bs.len() as u64,
            Body::Stream { length, .. } => *length,
        }
    }

    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bs) => f.debug_tuple("Bytes").field(&bs.len()).finish(),
            Body::Stream { length, .. } => f
                .debug_struct("Stream")
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bs: Bytes) -> Self {
        Body::Bytes(bs)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

/// HttpSend is the transport used to talk to the EveryTrail service.
///
/// Implementations must:
///
/// - return [`ErrorKind::Connection`](crate::ErrorKind::Connection) when the exchange fails,
/// - return [`ErrorKind::Timeout`](crate::ErrorKind::Timeout) when `timeout` elapses,
/// - abort the exchange when the returned future is dropped, that's how requests are cancelled.
///
/// [`Body::Stream`] bodies must be pulled lazily, the SDK reports upload
/// progress as chunks are taken from the stream.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send http request and return the response.
    async fn http_send(
        &self,
        req: http::Request<Body>,
        timeout: Option<Duration>,
    ) -> Result<http::Response<Bytes>>;
}
