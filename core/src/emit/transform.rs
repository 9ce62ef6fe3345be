//! Body transforms: stream a response body into a sink
//!
//! Every transform consumes the body stream exactly once and reports how
//! many bytes it wrote to the sink. Hashers and scratch buffers live in the
//! transform instance so one allocation serves a whole worker, reset per
//! response.

use std::io::Write;
use std::pin::Pin;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};

use crate::config::ResponseBodyMode;

/// A response body as a fallible chunk stream
pub type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Streams one body into a sink, returning bytes written to the sink
#[async_trait]
pub trait BodyTransform: Send {
    /// Consume `body` and write the transformed output to `out`
    async fn emit(&mut self, body: BodyStream, out: &mut (dyn Write + Send)) -> std::io::Result<u64>;
}

/// The transform instance for a body-emission mode
pub fn transform_for(mode: ResponseBodyMode) -> Box<dyn BodyTransform> {
    match mode {
        ResponseBodyMode::Raw => Box::new(RawBody),
        ResponseBodyMode::Discard => Box::new(DiscardBody),
        ResponseBodyMode::Escaped => Box::new(EscapedBody::default()),
        ResponseBodyMode::Base64 => Box::new(Base64Body),
        ResponseBodyMode::Sha256 => Box::new(Sha256Body::default()),
    }
}

/// Body bytes unchanged
struct RawBody;

#[async_trait]
impl BodyTransform for RawBody {
    async fn emit(&mut self, mut body: BodyStream, out: &mut (dyn Write + Send)) -> std::io::Result<u64> {
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(std::io::Error::other)?;
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }
}

/// Close the body, emit nothing
struct DiscardBody;

#[async_trait]
impl BodyTransform for DiscardBody {
    async fn emit(&mut self, body: BodyStream, _out: &mut (dyn Write + Send)) -> std::io::Result<u64> {
        drop(body);
        Ok(0)
    }
}

/// Buffer the body and emit it as one JSON string literal
#[derive(Default)]
struct EscapedBody {
    buffer: Vec<u8>,
}

#[async_trait]
impl BodyTransform for EscapedBody {
    async fn emit(&mut self, mut body: BodyStream, out: &mut (dyn Write + Send)) -> std::io::Result<u64> {
        self.buffer.clear();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(std::io::Error::other)?;
            self.buffer.extend_from_slice(&chunk);
        }

        if self.buffer.is_empty() {
            return Ok(0);
        }

        let literal = serde_json::to_vec(&String::from_utf8_lossy(&self.buffer))
            .map_err(std::io::Error::other)?;
        out.write_all(&literal)?;
        Ok(literal.len() as u64)
    }
}

/// Stream the body through a base64 encoder
struct Base64Body;

#[async_trait]
impl BodyTransform for Base64Body {
    async fn emit(&mut self, mut body: BodyStream, out: &mut (dyn Write + Send)) -> std::io::Result<u64> {
        let mut counter = CountingWriter::new(out);
        let mut encoder = base64::write::EncoderWriter::new(&mut counter, &BASE64);

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(std::io::Error::other)?;
            encoder.write_all(&chunk)?;
        }
        let counter = encoder.finish()?;

        Ok(counter.written())
    }
}

/// Hash the body, emit the lowercase hex digest
#[derive(Default)]
struct Sha256Body {
    hasher: Sha256,
}

#[async_trait]
impl BodyTransform for Sha256Body {
    async fn emit(&mut self, mut body: BodyStream, out: &mut (dyn Write + Send)) -> std::io::Result<u64> {
        // a previous emit may have bailed mid-body
        Digest::reset(&mut self.hasher);

        let mut body_bytes = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(std::io::Error::other)?;
            self.hasher.update(&chunk);
            body_bytes += chunk.len() as u64;
        }

        if body_bytes == 0 {
            return Ok(0);
        }

        let digest = hex::encode(self.hasher.finalize_reset());
        out.write_all(digest.as_bytes())?;
        Ok(digest.len() as u64)
    }
}

/// Counts bytes passing through to the wrapped writer
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
