//! Pipeline orchestration
//!
//! Wires parser -> request workers -> response workers with two bounded
//! channels, runs the parser driver to completion, then closes each channel
//! in turn and joins the pools. A parse error stops the input stream but
//! never aborts work already in flight.

use std::io::BufRead;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::PipelineConfig;
use crate::emit::{EmitPolicy, RecordSink, ResponseWorker, SharedWriter};
use crate::error::{Error, Result};
use crate::limiter::Throttle;
use crate::logger::LeveledLogger;
use crate::parser::DescriptorStream;
use crate::request::{BuiltRequest, RequestBuilder};
use crate::worker::{RequestWorker, RetryController};

/// The streams a pipeline run reads and writes
///
/// Production wires stdin/stdout/stderr; tests inject buffers.
pub struct PipelineIo {
    /// Request line input
    pub input: Box<dyn BufRead + Send>,

    /// Record output, newline-separated
    pub output: SharedWriter,

    /// Status/error logger
    pub logger: Arc<LeveledLogger>,
}

impl PipelineIo {
    /// Production wiring: stdin or the configured file in, stdout out,
    /// stderr logger. Failing to open the input file is fatal.
    pub fn standard(config: &PipelineConfig) -> Result<Self> {
        let logger: Arc<LeveledLogger> = if config.silent {
            Arc::new(LeveledLogger::silent())
        } else {
            Arc::new(LeveledLogger::stderr(config.color))
        };

        let input: Box<dyn BufRead + Send> = match &config.input {
            crate::config::Input::Stdin => Box::new(std::io::BufReader::new(std::io::stdin())),
            crate::config::Input::File(path) => {
                logger.info(&format!("Opening file of urls at: {}", path.display()));
                let file = std::fs::File::open(path).map_err(|e| {
                    Error::Config(format!(
                        "Unable to open specified file: {}: {e}",
                        path.display()
                    ))
                })?;
                Box::new(std::io::BufReader::new(file))
            }
        };

        Ok(Self {
            input,
            output: Arc::new(std::sync::Mutex::new(Box::new(std::io::stdout()))),
            logger,
        })
    }
}

/// Runs one pipeline from input exhaustion to drained sinks
pub struct Pipeline {
    config: PipelineConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Pipeline {
    /// Pipeline for a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            shutdown_tx,
        })
    }

    /// Cancel in-flight work; enqueued-but-unstarted descriptors are dropped
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run to completion
    pub async fn run(&self, io: PipelineIo) -> Result<()> {
        let PipelineIo {
            input,
            output,
            logger,
        } = io;

        let client = build_client(&self.config)?;
        let throttle = Arc::new(Throttle::new(self.config.throttle_per_second));
        let retry = Arc::new(RetryController::new(
            client,
            throttle,
            Arc::clone(&logger),
            self.config.retries,
            self.config.base_retry_delay,
        ));

        let (requests_tx, requests_rx) = mpsc::channel::<BuiltRequest>(self.config.request_workers);
        let (responses_tx, responses_rx) = mpsc::channel(self.config.response_workers);
        let requests_rx = Arc::new(Mutex::new(requests_rx));
        let responses_rx = Arc::new(Mutex::new(responses_rx));

        tracing::debug!(
            request_workers = self.config.request_workers,
            response_workers = self.config.response_workers,
            throttle = ?self.config.throttle_per_second,
            "starting pipeline"
        );

        let mut request_handles = Vec::with_capacity(self.config.request_workers);
        for worker_id in 0..self.config.request_workers {
            let worker = RequestWorker::new(
                worker_id,
                Arc::clone(&retry),
                Arc::clone(&requests_rx),
                responses_tx.clone(),
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            request_handles.push(tokio::spawn(async move { worker.run(shutdown_rx).await }));
        }
        // workers hold their own clones; the pool closes downstream by exiting
        drop(responses_tx);

        let mut response_handles = Vec::with_capacity(self.config.response_workers);
        for worker_id in 0..self.config.response_workers {
            let worker = ResponseWorker::new(
                worker_id,
                EmitPolicy::from_config(&self.config),
                Arc::clone(&responses_rx),
                RecordSink::from_config(&self.config, Arc::clone(&output)),
                Arc::clone(&logger),
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            response_handles.push(tokio::spawn(async move { worker.run(shutdown_rx).await }));
        }

        // the driver owns the only request sender; the upstream channel
        // closes when it returns
        let driver_logger = Arc::clone(&logger);
        let builder = RequestBuilder::new(&self.config);
        let data_template = self.config.data_template.clone();
        let driver = tokio::task::spawn_blocking(move || {
            drive_parser(input, data_template, builder, requests_tx, driver_logger)
        });

        // a parse error before any request issued is fatal; later ones are
        // logged while in-flight work drains
        let mut fatal = None;
        match driver.await {
            Ok((_, None)) => {}
            Ok((0, Some(e))) => fatal = Some(e),
            Ok((_, Some(e))) => logger.log_error("error parsing requests", &e),
            Err(e) => logger.log_error("error parsing requests", &e),
        }

        for (worker_id, handle) in request_handles.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => tracing::debug!(
                    worker_id,
                    completed = stats.completed,
                    dropped = stats.dropped,
                    "request worker joined"
                ),
                Err(e) => tracing::error!(worker_id, error = %e, "request worker panicked"),
            }
        }

        for (worker_id, handle) in response_handles.into_iter().enumerate() {
            match handle.await {
                Ok(emitted) => tracing::debug!(worker_id, emitted, "response worker joined"),
                Err(e) => tracing::error!(worker_id, error = %e, "response worker panicked"),
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run with ctrl-c triggering graceful shutdown
    pub async fn run_with_signal_handling(&self, io: PipelineIo) -> Result<()> {
        let shutdown_tx = self.shutdown_tx.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::debug!("received ctrl-c, shutting down");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
            }
        });

        let result = self.run(io).await;
        signal_handle.abort();
        result
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish()
    }
}

/// One shared client for every worker: keep-alive pool, per-attempt timeout
fn build_client(config: &PipelineConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.connect_timeout)
        .pool_max_idle_per_host(50)
        .danger_accept_invalid_certs(config.insecure)
        .build()
        .map_err(Error::Transport)
}

/// Parse input and feed built requests into the bounded channel.
///
/// Build failures drop the descriptor with one error log; a parse error
/// ends the stream. Returns how many requests were sent and the parse
/// error, if any.
fn drive_parser(
    input: Box<dyn BufRead + Send>,
    data_template: Option<String>,
    builder: RequestBuilder,
    requests_tx: mpsc::Sender<BuiltRequest>,
    logger: Arc<LeveledLogger>,
) -> (u64, Option<Error>) {
    let mut sent = 0u64;

    for item in DescriptorStream::new(input, data_template) {
        let descriptor = match item {
            Ok(descriptor) => descriptor,
            Err(e) => return (sent, Some(e)),
        };

        match builder.build(descriptor) {
            Ok(built) => {
                if requests_tx.blocking_send(built).is_err() {
                    // receivers are gone, shutdown is underway
                    break;
                }
                sent += 1;
            }
            Err(Error::BuildRequest { url, message }) => logger.log_error(&url, &message),
            Err(e) => logger.log_error("error building request", &e),
        }
    }

    (sent, None)
}
