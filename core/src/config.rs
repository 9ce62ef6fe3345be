//! Pipeline configuration types

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on worker counts, far above anything useful
pub const MAX_WORKERS: usize = 1 << 20;

/// How a response body is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseBodyMode {
    /// Stream body bytes unchanged
    #[default]
    Raw,
    /// Close the body, emit nothing
    Discard,
    /// Emit the body as a JSON string literal
    Escaped,
    /// Emit the body base64-encoded
    Base64,
    /// Emit the lowercase hex SHA-256 digest of the body
    Sha256,
}

impl FromStr for ResponseBodyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "raw" => Ok(ResponseBodyMode::Raw),
            "discard" => Ok(ResponseBodyMode::Discard),
            "escaped" => Ok(ResponseBodyMode::Escaped),
            "base64" => Ok(ResponseBodyMode::Base64),
            "sha256" => Ok(ResponseBodyMode::Sha256),
            other => Err(format!(
                "invalid response-body value: {other}, valid values: \"raw\", \"base64\", \"discard\", \"escaped\", \"sha256\""
            )),
        }
    }
}

impl std::fmt::Display for ResponseBodyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseBodyMode::Raw => "raw",
            ResponseBodyMode::Discard => "discard",
            ResponseBodyMode::Escaped => "escaped",
            ResponseBodyMode::Base64 => "base64",
            ResponseBodyMode::Sha256 => "sha256",
        };
        write!(f, "{name}")
    }
}

/// Where the request stream comes from
#[derive(Debug, Clone, Default)]
pub enum Input {
    /// Read standard input
    #[default]
    Stdin,
    /// Read the given file
    File(PathBuf),
}

/// A single static request header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as given
    pub name: String,
    /// Header value
    pub value: String,
}

impl Header {
    /// Create a header from name and value
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a `Name: Value` flag argument
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("header must be in \"Name: Value\" format: {raw}"))?;
        Ok(Self::new(name.trim(), value.trim()))
    }
}

/// Process-wide request/response pipeline configuration
///
/// Built once from parsed flags and shared read-only by every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where to read request lines from
    pub input: Input,

    /// Default HTTP method, overridable per JSON-Lines descriptor
    pub request_method: String,

    /// Headers sent with every request
    pub request_headers: Vec<Header>,

    /// Printf-style body template for delimited input (`%s` slots, `%%` escape)
    pub data_template: Option<String>,

    /// Number of concurrent request workers
    pub request_workers: usize,

    /// Number of concurrent response workers
    pub response_workers: usize,

    /// Per-attempt timeout covering connect through response headers
    pub connect_timeout: Duration,

    /// Max retries on transient errors (5xx, timeouts)
    pub retries: u32,

    /// Base delay for exponential retry backoff
    pub base_retry_delay: Duration,

    /// Global request-per-second ceiling; `None` disables throttling
    pub throttle_per_second: Option<NonZeroU32>,

    /// Skip TLS certificate verification
    pub insecure: bool,

    /// Write each response body to its own file under this directory
    pub output_directory: Option<PathBuf>,

    /// Length of the hashed subdirectory name used with `output_directory`
    pub subdir_length: i32,

    /// Body emission mode
    pub response_body: ResponseBodyMode,

    /// Wrap each emission in a JSON envelope with url, code, body, context
    pub json_envelope: bool,

    /// Suppress all stderr output
    pub silent: bool,

    /// ANSI-colored stderr
    pub color: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: Input::Stdin,
            request_method: "GET".to_string(),
            request_headers: Vec::new(),
            data_template: None,
            request_workers: 1,
            response_workers: 1,
            connect_timeout: Duration::from_millis(10_000),
            retries: 0,
            base_retry_delay: Duration::from_millis(1_000),
            throttle_per_second: None,
            insecure: false,
            output_directory: None,
            subdir_length: 0,
            response_body: ResponseBodyMode::Raw,
            json_envelope: false,
            silent: false,
            color: false,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.request_workers == 0 || self.request_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(format!(
                "workers must be between 1 and {MAX_WORKERS}"
            )));
        }

        if self.response_workers == 0 || self.response_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(format!(
                "response-workers must be between 1 and {MAX_WORKERS}"
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect-timeout-millis must be positive".into(),
            ));
        }

        Ok(())
    }

    /// True when responses are saved to files instead of standard output
    pub fn writes_files(&self) -> bool {
        self.output_directory.is_some()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Worker count out of range
    #[error("invalid workers: {0}")]
    InvalidWorkers(String),

    /// Timeout out of range
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.request_method, "GET");
        assert_eq!(config.request_workers, 1);
        assert_eq!(config.response_workers, 1);
        assert_eq!(config.connect_timeout, Duration::from_millis(10_000));
        assert_eq!(config.base_retry_delay, Duration::from_millis(1_000));
        assert!(config.throttle_per_second.is_none());
        assert!(!config.writes_files());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_workers() {
        let config = PipelineConfig {
            request_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_too_many_workers() {
        let config = PipelineConfig {
            response_workers: MAX_WORKERS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_response_body_mode_round_trip() {
        for name in ["raw", "discard", "escaped", "base64", "sha256"] {
            let mode: ResponseBodyMode = name.parse().expect("valid mode");
            assert_eq!(mode.to_string(), name);
        }
        assert!("gzip".parse::<ResponseBodyMode>().is_err());
        assert_eq!(
            "".parse::<ResponseBodyMode>().expect("empty defaults to raw"),
            ResponseBodyMode::Raw
        );
    }

    #[test]
    fn test_header_parse() {
        let header = Header::parse("X-Api-Key: secret").expect("valid header");
        assert_eq!(header.name, "X-Api-Key");
        assert_eq!(header.value, "secret");

        let colon_value = Header::parse("Authorization: Bearer a:b:c").expect("valid header");
        assert_eq!(colon_value.value, "Bearer a:b:c");

        assert!(Header::parse("NoColonHere").is_err());
    }
}
