//! Response emission: transforms, envelope, sinks, and the response workers
//!
//! An [`EmitPolicy`] is built once per response worker and composes the two
//! orthogonal choices: body transform and JSON envelope. Records destined
//! for standard output are buffered and written in one locked pass so
//! concurrent workers cannot interleave bytes; file records get their own
//! file each.

pub mod file_sink;
mod transform;

pub use transform::{transform_for, BodyStream, BodyTransform};

mod envelope;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::{PipelineConfig, ResponseBodyMode};
use crate::logger::LeveledLogger;
use crate::response::ResponseRecord;

/// Shared, lock-guarded output sink (stdout in production, buffers in tests)
pub type SharedWriter = Arc<std::sync::Mutex<Box<dyn Write + Send>>>;

/// Per-worker emission state: transform instance, envelope flag, scratch
pub struct EmitPolicy {
    mode: ResponseBodyMode,
    json_envelope: bool,
    transform: Box<dyn BodyTransform>,
    scratch: Vec<u8>,
}

impl EmitPolicy {
    /// Policy for the configured transform and envelope setting
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            mode: config.response_body,
            json_envelope: config.json_envelope,
            transform: transform_for(config.response_body),
            scratch: Vec::new(),
        }
    }

    /// Emit one record into `out`, returning bytes written.
    ///
    /// The record's body stream is consumed (or dropped) exactly once on
    /// every path through here.
    pub async fn emit(
        &mut self,
        record: ResponseRecord,
        out: &mut (dyn Write + Send),
    ) -> std::io::Result<u64> {
        let ResponseRecord {
            url,
            status,
            response,
            context,
        } = record;
        let body: BodyStream = Box::pin(response.bytes_stream());

        if self.json_envelope {
            envelope::emit_enveloped(
                self.mode,
                self.transform.as_mut(),
                &mut self.scratch,
                &url,
                status.as_u16(),
                context.as_ref(),
                body,
                out,
            )
            .await
        } else {
            self.transform.emit(body, out).await
        }
    }
}

impl std::fmt::Debug for EmitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitPolicy")
            .field("mode", &self.mode)
            .field("json_envelope", &self.json_envelope)
            .finish()
    }
}

/// Where finished records go
pub enum RecordSink {
    /// Newline-separated records on a shared writer
    Stream(SharedWriter),
    /// One file per response under a base directory
    Files {
        /// Output base directory
        directory: PathBuf,
        /// Hashed subdirectory name length
        subdir_length: i32,
    },
}

impl RecordSink {
    /// Sink matching the configuration, falling back to the shared writer
    pub fn from_config(config: &PipelineConfig, out: SharedWriter) -> Self {
        match &config.output_directory {
            Some(directory) => RecordSink::Files {
                directory: directory.clone(),
                subdir_length: config.subdir_length,
            },
            None => RecordSink::Stream(out),
        }
    }
}

/// One response worker: pull records, emit them, log the outcome
pub struct ResponseWorker {
    id: usize,
    policy: EmitPolicy,
    records_rx: Arc<Mutex<mpsc::Receiver<ResponseRecord>>>,
    sink: RecordSink,
    logger: Arc<LeveledLogger>,
    record_buf: Vec<u8>,
}

impl ResponseWorker {
    /// Create a worker over the shared record channel
    pub fn new(
        id: usize,
        policy: EmitPolicy,
        records_rx: Arc<Mutex<mpsc::Receiver<ResponseRecord>>>,
        sink: RecordSink,
        logger: Arc<LeveledLogger>,
    ) -> Self {
        Self {
            id,
            policy,
            records_rx,
            sink,
            logger,
            record_buf: Vec::new(),
        }
    }

    /// Run until the record channel closes or shutdown fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> usize {
        let mut emitted = 0usize;

        tracing::debug!(worker_id = self.id, "response worker started");

        loop {
            let record = tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::debug!(worker_id = self.id, "response worker received shutdown");
                    break;
                }

                received = async { self.records_rx.lock().await.recv().await } => {
                    match received {
                        Some(record) => record,
                        None => break,
                    }
                }
            };

            self.handle_record(record).await;
            emitted += 1;
        }

        tracing::debug!(worker_id = self.id, emitted, "response worker finished");
        emitted
    }

    async fn handle_record(&mut self, record: ResponseRecord) {
        if matches!(self.sink, RecordSink::Stream(_)) {
            self.emit_to_stream(record).await;
        } else {
            self.emit_to_file(record).await;
        }
    }

    /// Buffer the record, then write it and its separating newline under one
    /// lock hold; the status line lands between record and newline.
    async fn emit_to_stream(&mut self, record: ResponseRecord) {
        let url = record.url.clone();
        let status = record.status.as_u16();

        self.record_buf.clear();
        let mut buf = std::mem::take(&mut self.record_buf);
        let result = self.policy.emit(record, &mut buf).await;
        self.record_buf = buf;

        let RecordSink::Stream(out) = &self.sink else {
            return;
        };

        match result {
            Ok(bytes_written) => {
                let mut writer = match out.lock() {
                    Ok(writer) => writer,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Err(e) = writer.write_all(&self.record_buf) {
                    self.logger.log_error(&url, &e);
                    return;
                }
                self.logger.log_response(status, &url);
                if bytes_written > 0 {
                    if let Err(e) = writer.write_all(b"\n") {
                        self.logger.log_error(&url, &e);
                    }
                }
            }
            Err(e) => self.logger.log_error(&url, &e),
        }
    }

    async fn emit_to_file(&mut self, record: ResponseRecord) {
        let url = record.url.clone();
        let status = record.status.as_u16();

        let RecordSink::Files {
            directory,
            subdir_length,
        } = &self.sink
        else {
            return;
        };

        let filename = file_sink::sanitized_filename(&url);
        let path = file_sink::target_path(directory, *subdir_length, &filename);
        let location = format!("{url} -> {}", path.display());

        let result = async {
            let mut file = file_sink::create(&path)?;
            let written = self.policy.emit(record, &mut file).await?;
            file.flush()?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        match result {
            Ok(_) => self.logger.log_response(status, &location),
            Err(e) => self.logger.log_error(&location, &e),
        }
    }
}

impl std::fmt::Debug for ResponseWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWorker")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .finish()
    }
}
