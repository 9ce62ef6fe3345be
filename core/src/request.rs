//! Request descriptors and the request builder

use reqwest::header::{HeaderName, HeaderValue, CONNECTION};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::config::{Header, PipelineConfig};
use crate::error::{Error, Result};

/// One parsed unit of input, ready to be built into an HTTP request
///
/// Produced by the parser, consumed exactly once by [`RequestBuilder`].
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    /// Target URL, never empty
    pub url: String,

    /// Per-descriptor method override
    pub method: Option<String>,

    /// Per-descriptor headers, merged over the static set on build
    pub headers: Vec<Header>,

    /// Decoded request body bytes
    pub body: Option<Vec<u8>>,

    /// Opaque pass-through value carried to the emitted record
    pub context: Option<Value>,
}

impl RequestDescriptor {
    /// Descriptor for a bare URL with no overrides
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// A request built from a descriptor, paired with what survives the round trip
#[derive(Debug)]
pub struct BuiltRequest {
    /// The URL string, kept for logging and file naming
    pub url: String,

    /// The concrete HTTP request
    pub request: reqwest::Request,

    /// Pass-through context from the descriptor
    pub context: Option<Value>,
}

/// Turns descriptors into concrete HTTP requests using the static config
///
/// Merging rules: static headers first, then per-descriptor headers, the
/// descriptor winning on name collision (case-insensitive). `Connection:
/// keep-alive` is always present.
#[derive(Debug)]
pub struct RequestBuilder {
    default_method: String,
    static_headers: Vec<Header>,
}

impl RequestBuilder {
    /// Builder using the config's default method and static headers
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            default_method: config.request_method.clone(),
            static_headers: config.request_headers.clone(),
        }
    }

    /// Build the native request for one descriptor
    pub fn build(&self, descriptor: RequestDescriptor) -> Result<BuiltRequest> {
        let url = Url::parse(&descriptor.url)
            .map_err(|e| Error::build_request(&descriptor.url, e.to_string()))?;

        let method_name = descriptor
            .method
            .as_deref()
            .unwrap_or(&self.default_method);
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| Error::build_request(&descriptor.url, format!("invalid method: {method_name}")))?;

        let mut request = reqwest::Request::new(method, url);

        for header in merge_headers(&self.static_headers, &descriptor.headers) {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| {
                Error::build_request(&descriptor.url, format!("invalid header name: {}", header.name))
            })?;
            let value = HeaderValue::from_str(&header.value).map_err(|_| {
                Error::build_request(&descriptor.url, format!("invalid header value for {}", header.name))
            })?;
            request.headers_mut().insert(name, value);
        }

        // keep-alive is non-negotiable, the connection pool depends on it
        request
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        if let Some(bytes) = descriptor.body {
            *request.body_mut() = Some(reqwest::Body::from(bytes));
        }

        Ok(BuiltRequest {
            url: descriptor.url,
            request,
            context: descriptor.context,
        })
    }
}

/// Merge descriptor headers over the static set, preserving static order
pub fn merge_headers(static_headers: &[Header], overrides: &[Header]) -> Vec<Header> {
    let mut merged: Vec<Header> = static_headers.to_vec();

    for header in overrides {
        match merged
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&header.name))
        {
            Some(existing) => existing.value = header.value.clone(),
            None => merged.push(header.clone()),
        }
    }

    merged
}
