//! JSON envelope around an emitted record
//!
//! Byte format, including the spacing:
//!
//! ```text
//! { "url": <url>, "code": <status>, "body": <B>[, "context": <C>] }
//! ```
//!
//! `raw` bodies are assumed to already be JSON and stream straight into the
//! body slot; `discard` and empty bodies become `null`; every other
//! transform's output is wrapped in one pair of double quotes. `context` is
//! the descriptor's pass-through value serialized as canonical JSON.

use std::io::Write;

use serde_json::Value;

use crate::config::ResponseBodyMode;

use super::transform::{BodyStream, BodyTransform};

/// Write one enveloped record, returning bytes written to `out`
#[allow(clippy::too_many_arguments)]
pub async fn emit_enveloped(
    mode: ResponseBodyMode,
    transform: &mut (dyn BodyTransform),
    scratch: &mut Vec<u8>,
    url: &str,
    status: u16,
    context: Option<&Value>,
    body: BodyStream,
    out: &mut (dyn Write + Send),
) -> std::io::Result<u64> {
    let mut written = 0u64;

    let prefix = format!("{{ \"url\": \"{url}\", \"code\": {status}, \"body\": ");
    out.write_all(prefix.as_bytes())?;
    written += prefix.len() as u64;

    let body_written = match mode {
        // raw is assumed to be JSON already and discard writes nothing,
        // neither needs quoting
        ResponseBodyMode::Raw | ResponseBodyMode::Discard => {
            let n = transform.emit(body, out).await?;
            written += n;
            n
        }
        _ => {
            scratch.clear();
            let n = transform.emit(body, scratch).await?;
            if n > 0 {
                out.write_all(b"\"")?;
                out.write_all(scratch)?;
                out.write_all(b"\"")?;
                written += scratch.len() as u64 + 2;
            }
            n
        }
    };

    if body_written == 0 {
        out.write_all(b"null")?;
        written += 4;
    }

    if let Some(value) = context {
        let json = serde_json::to_string(value).map_err(std::io::Error::other)?;
        let segment = format!(", \"context\": {json}");
        out.write_all(segment.as_bytes())?;
        written += segment.len() as u64;
    }

    out.write_all(b" }")?;
    written += 2;

    Ok(written)
}
