//! Request worker pool
//!
//! Exactly `request_workers` tasks pull built requests from a shared bounded
//! channel, pay a throttle token per attempt, run the retry controller, and
//! push response records downstream. All workers share one HTTP client and
//! its connection pool.

mod executor;
mod retry;

pub use executor::{RequestWorker, WorkerStats};
pub use retry::RetryController;
