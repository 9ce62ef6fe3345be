//! JSON-Lines input parsing
//!
//! Each non-empty line is a JSON object. `url` is required; `method`,
//! `headers`, `context`, `body`, and `bodyType` are optional. A malformed
//! line aborts the stream.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::config::Header;
use crate::error::{Error, Result};
use crate::request::RequestDescriptor;

/// One line of JSON-Lines input
///
/// `body` is captured as raw JSON so the bytes of a `json`-typed body pass
/// through exactly as written.
#[derive(Debug, Deserialize)]
struct JsonLine {
    #[serde(default)]
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    body: Option<Box<RawValue>>,
    #[serde(default, rename = "bodyType")]
    body_type: Option<String>,
}

/// Parse one raw JSON line into a descriptor.
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str, line_number: u64) -> Result<Option<RequestDescriptor>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed: JsonLine = serde_json::from_str(trimmed)
        .map_err(|e| Error::parse(line_number, format!("{e}: {trimmed}")))?;

    if parsed.url.is_empty() {
        return Err(Error::parse(
            line_number,
            format!("missing url property: {trimmed}"),
        ));
    }

    let body = match parsed.body {
        Some(raw) => Some(decode_body(
            parsed.body_type.as_deref(),
            &raw,
            line_number,
        )?),
        None => None,
    };

    let headers = parsed
        .headers
        .map(|map| {
            map.into_iter()
                .map(|(name, value)| Header::new(name, value))
                .collect()
        })
        .unwrap_or_default();

    let mut descriptor = RequestDescriptor::url(parsed.url);
    descriptor.method = parsed.method;
    descriptor.headers = headers;
    descriptor.context = parsed.context;
    descriptor.body = body;
    Ok(Some(descriptor))
}

/// Decode the inline body per its declared encoding
fn decode_body(body_type: Option<&str>, raw: &RawValue, line_number: u64) -> Result<Vec<u8>> {
    match body_type {
        None | Some("json") => Ok(raw.get().as_bytes().to_vec()),
        Some("escaped") => {
            let unquoted: String = serde_json::from_str(raw.get())
                .map_err(|e| Error::parse(line_number, format!("failed to parse body: {e}")))?;
            Ok(unquoted.into_bytes())
        }
        Some("base64") => {
            let unquoted: String = serde_json::from_str(raw.get())
                .map_err(|e| Error::parse(line_number, format!("failed to parse body: {e}")))?;
            BASE64
                .decode(unquoted.as_bytes())
                .map_err(|e| Error::parse(line_number, format!("failed to parse body: {e}")))
        }
        Some(other) => Err(Error::parse(
            line_number,
            format!("unsupported body type: {other}, valid values: \"json\", \"base64\", \"escaped\""),
        )),
    }
}
