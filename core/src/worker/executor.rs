//! Request worker execution loop

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

use crate::request::BuiltRequest;
use crate::response::ResponseRecord;

use super::retry::RetryController;

/// Counters a worker reports when it exits
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    /// Requests that produced a response record
    pub completed: usize,

    /// Requests dropped after exhausting retries on transport errors
    pub dropped: usize,
}

/// One request worker: receive, throttle+retry, forward the response
///
/// Workers are stateless tokio tasks sharing the upstream receiver behind a
/// mutex; when the channel is closed and drained, the worker exits.
pub struct RequestWorker {
    id: usize,
    retry: Arc<RetryController>,
    requests_rx: Arc<Mutex<mpsc::Receiver<BuiltRequest>>>,
    responses_tx: mpsc::Sender<ResponseRecord>,
}

impl RequestWorker {
    /// Create a worker over the shared request channel
    pub fn new(
        id: usize,
        retry: Arc<RetryController>,
        requests_rx: Arc<Mutex<mpsc::Receiver<BuiltRequest>>>,
        responses_tx: mpsc::Sender<ResponseRecord>,
    ) -> Self {
        Self {
            id,
            retry,
            requests_rx,
            responses_tx,
        }
    }

    /// Run until the upstream channel closes or shutdown fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        let mut stats = WorkerStats::default();

        tracing::debug!(worker_id = self.id, "request worker started");

        loop {
            let built = tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!(worker_id = self.id, "request worker received shutdown");
                    break;
                }

                received = async { self.requests_rx.lock().await.recv().await } => {
                    match received {
                        Some(built) => built,
                        None => break,
                    }
                }
            };

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!(worker_id = self.id, "request worker canceled in flight");
                    break;
                }

                outcome = self.retry.execute(built) => {
                    match outcome {
                        Some(record) => {
                            stats.completed += 1;
                            if self.responses_tx.send(record).await.is_err() {
                                tracing::debug!(
                                    worker_id = self.id,
                                    "response channel closed, request worker stopping"
                                );
                                break;
                            }
                        }
                        None => stats.dropped += 1,
                    }
                }
            }
        }

        tracing::debug!(
            worker_id = self.id,
            completed = stats.completed,
            dropped = stats.dropped,
            "request worker finished"
        );

        stats
    }
}

impl std::fmt::Debug for RequestWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestWorker").field("id", &self.id).finish()
    }
}
