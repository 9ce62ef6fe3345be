//! Core request/response pipeline for ganda
//!
//! This crate provides the streaming, massively-parallel HTTP pipeline
//! behind the `ganda` binary:
//!
//! - Input parsing (URL-per-line and JSON-Lines modes)
//! - Request building with static/per-descriptor header merging
//! - A bounded pool of request workers with a global throttle and
//!   retry/backoff controller
//! - Response emission with body transforms and an optional JSON envelope,
//!   to standard output or per-response files
//!
//! Data flow: input -> parser -> request builder -> (bounded channel) ->
//! request workers -> (bounded channel) -> response workers -> sink. Status
//! and error lines are separated onto standard error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod emit;
pub mod error;
pub mod limiter;
pub mod logger;
pub mod orchestrator;
pub mod parser;
pub mod request;
pub mod response;
pub mod worker;

pub use config::{Header, Input, PipelineConfig, ResponseBodyMode};
pub use error::{Error, Result};
pub use logger::LeveledLogger;
pub use orchestrator::{Pipeline, PipelineIo};

/// Commonly used types
pub mod prelude {
    pub use crate::config::{PipelineConfig, ResponseBodyMode};
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{Pipeline, PipelineIo};
}
