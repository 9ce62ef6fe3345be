//! Response records flowing from request workers to the emitter

use reqwest::StatusCode;
use serde_json::Value;

/// The terminal outcome of one descriptor's retry loop
///
/// Carries the still-unread body stream; the emitter consumes or discards it
/// exactly once. Dropping the record closes the stream.
#[derive(Debug)]
pub struct ResponseRecord {
    /// The request URL, kept for logging and file naming
    pub url: String,

    /// Final HTTP status
    pub status: StatusCode,

    /// The response with its unconsumed body
    pub response: reqwest::Response,

    /// Pass-through context from the originating descriptor
    pub context: Option<Value>,
}
