//! Retry controller: one descriptor through possibly many HTTP attempts
//!
//! Outcome classification per attempt:
//! - transport error: retriable
//! - status >= 500: retriable, body drained and closed first
//! - status < 500: terminal, surfaced as the final response
//!
//! The final attempt's response is always surfaced, even a 5xx, so the
//! caller sees what the server last said. A transport error on the final
//! attempt is logged and the descriptor is dropped with no emission.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::limiter::Throttle;
use crate::logger::LeveledLogger;
use crate::request::BuiltRequest;
use crate::response::ResponseRecord;

/// Executes built requests with rate limiting, retries, and backoff
pub struct RetryController {
    client: Client,
    throttle: Arc<Throttle>,
    logger: Arc<LeveledLogger>,
    retries: u32,
    base_delay: Duration,
}

impl RetryController {
    /// Controller sharing the given client, throttle, and logger
    pub fn new(
        client: Client,
        throttle: Arc<Throttle>,
        logger: Arc<LeveledLogger>,
        retries: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            client,
            throttle,
            logger,
            retries,
            base_delay,
        }
    }

    /// Run one built request to its terminal outcome.
    ///
    /// Returns `None` when the descriptor is dropped (transport failure on
    /// the final attempt); the error has already been logged.
    pub async fn execute(&self, built: BuiltRequest) -> Option<ResponseRecord> {
        let BuiltRequest {
            url,
            request,
            context,
        } = built;

        let mut attempt: u32 = 1;
        let mut current = request;

        loop {
            // every attempt, retries included, pays a throttle token
            self.throttle.acquire().await;

            // a request whose body cannot be cloned gets no further attempts
            let retry_clone = if attempt > self.retries {
                None
            } else {
                current.try_clone()
            };
            let is_final = attempt > self.retries || retry_clone.is_none();

            match self.client.execute(current).await {
                Ok(response) if response.status().is_server_error() && !is_final => {
                    self.logger.warn(&format!(
                        "Response: {} {} ({})",
                        response.status().as_u16(),
                        url,
                        attempt
                    ));
                    drain(response).await;
                }
                Ok(response) => {
                    return Some(ResponseRecord {
                        url,
                        status: response.status(),
                        response,
                        context,
                    });
                }
                Err(err) if !is_final => {
                    self.logger
                        .warn(&format!("{url} Error: {err} ({attempt})"));
                }
                Err(err) => {
                    self.logger.log_error(&url, &err);
                    return None;
                }
            }

            tokio::time::sleep(self.backoff_delay(attempt)).await;

            let Some(retry_request) = retry_clone else {
                return None;
            };
            current = retry_request;
            attempt += 1;
        }
    }

    /// Exponential backoff: `base * 2^(attempt-1)`
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("retries", &self.retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

/// Consume and close a body that is about to be retried
async fn drain(mut response: reqwest::Response) {
    while let Ok(Some(_)) = response.chunk().await {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(retries: u32, base_millis: u64) -> RetryController {
        RetryController::new(
            Client::new(),
            Arc::new(Throttle::unlimited()),
            Arc::new(LeveledLogger::silent()),
            retries,
            Duration::from_millis(base_millis),
        )
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let controller = controller(3, 100);
        assert_eq!(controller.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(controller.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(controller.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let controller = controller(u32::MAX, 1000);
        let delay = controller.backoff_delay(64);
        assert!(delay >= Duration::from_secs(1000));
    }
}
