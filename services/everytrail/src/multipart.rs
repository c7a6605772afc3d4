use crate::arguments::Value;
use crate::constants::*;
use bytes::Bytes;
use everytrail_core::utils::generate_uuid;
use everytrail_core::{Body, Error, Result};
use futures::{future, stream, StreamExt, TryStreamExt};
use log::debug;
use std::io;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;

/// An image copied into a temporary file.
///
/// The file is deleted when this value, or the body built from it, is dropped.
#[derive(Debug)]
pub(crate) struct SpooledImage {
    path: TempPath,
    length: u64,
}

impl SpooledImage {
    pub(crate) fn len(&self) -> u64 {
        self.length
    }
}

/// Copy `image` into a temporary file so its length is known before sending.
pub(crate) async fn spool_image(mut image: impl AsyncRead + Unpin) -> Result<SpooledImage> {
    let file = tempfile::Builder::new()
        .prefix("everytrail-upload-")
        .suffix(".jpg")
        .tempfile()
        .map_err(|e| Error::unknown("failed to create upload spool file").with_source(e))?;
    let (file, path) = file.into_parts();

    let mut file = File::from_std(file);
    let length = tokio::io::copy(&mut image, &mut file)
        .await
        .map_err(|e| Error::unknown("failed to read upload image").with_source(e))?;
    file.flush().await?;

    debug!("spooled upload image into {}: {length} bytes", path.display());
    Ok(SpooledImage { path, length })
}

/// A `multipart/form-data` upload body.
///
/// ```text
/// --{boundary}\r\n
/// Content-Disposition: form-data; name="{key}"\r\n
/// \r\n
/// {value}\r\n
/// ...
/// --{boundary}\r\n
/// Content-Disposition: form-data; name="photo"; filename="{filename}"\r\n
/// Content-Type: image/jpeg\r\n
/// \r\n
/// {image}\r\n
/// --{boundary}--\r\n
/// ```
#[derive(Debug)]
pub(crate) struct MultipartForm {
    boundary: String,
    head: Bytes,
    tail: Bytes,
    image: SpooledImage,
}

impl MultipartForm {
    pub(crate) fn new(fields: &[(String, Value)], filename: &str, image: SpooledImage) -> Self {
        let boundary = format!("Boundary-{}", generate_uuid());

        let mut head = Vec::new();
        for (key, value) in fields {
            head.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    sanitize(key)
                )
                .as_bytes(),
            );
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{UPLOAD_FILE_FIELD}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                sanitize_filename(filename)
            )
            .as_bytes(),
        );
        let tail = format!("\r\n--{boundary}--\r\n");

        Self {
            boundary,
            head: Bytes::from(head),
            tail: Bytes::from(tail),
            image,
        }
    }

    pub(crate) fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Total length of the body.
    pub(crate) fn len(&self) -> u64 {
        self.head.len() as u64 + self.image.len() + self.tail.len() as u64
    }

    /// Build a streamed body, reporting `(sent, total)` as chunks are pulled.
    pub(crate) fn into_body(self, progress: Option<UnboundedSender<(u64, u64)>>) -> Body {
        let total = self.len();
        let MultipartForm {
            head, tail, image, ..
        } = self;

        // The temp path lives in the stream state, the file is removed once
        // the stream is exhausted or dropped.
        let chunks = stream::try_unfold((None, image.path), read_chunk);

        let mut sent = 0;
        let stream = stream::once(future::ready(io::Result::Ok(head)))
            .chain(chunks)
            .chain(stream::once(future::ready(Ok(tail))))
            .inspect_ok(move |chunk: &Bytes| {
                sent += chunk.len() as u64;
                if let Some(tx) = &progress {
                    // The receiver is gone once the request is over.
                    let _ = tx.send((sent, total));
                }
            })
            .boxed();

        Body::Stream {
            stream,
            length: total,
        }
    }
}

async fn read_chunk(
    (file, path): (Option<File>, TempPath),
) -> io::Result<Option<(Bytes, (Option<File>, TempPath))>> {
    let mut file = match file {
        Some(file) => file,
        None => File::open(&path).await?,
    };
    let mut buf = vec![0; UPLOAD_CHUNK_SIZE];
    let n = file.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((Bytes::from(buf), (Some(file), path))))
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| match c {
            '"' => "%22".to_string(),
            c => c.to_string(),
        })
        .collect()
}

fn sanitize_filename(filename: &str) -> String {
    let filename = sanitize(filename.trim());
    if filename.is_empty() {
        "image.jpg".to_string()
    } else {
        filename
    }
}
