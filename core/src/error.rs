//! Error types for ganda-core

use thiserror::Error;

/// Core error type
///
/// Classification follows what the pipeline does with each kind: parse errors
/// abort the input stream, build errors drop the descriptor, transport errors
/// are retriable, sink errors are logged and the pipeline continues.
#[derive(Error, Debug)]
pub enum Error {
    /// Input line could not be parsed
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based input line number
        line: u64,
        /// What went wrong, including the offending content where useful
        message: String,
    },

    /// Descriptor could not be turned into an HTTP request
    #[error("cannot build request for {url}: {message}")]
    BuildRequest {
        /// The URL from the descriptor
        url: String,
        /// What went wrong
        message: String,
    },

    /// Network-level failure (DNS, connect, timeout, reset)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Reading input or writing to a sink failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Parse error for the given input line
    pub fn parse(line: u64, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    /// Build error for the given URL
    pub fn build_request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BuildRequest {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
