//! Leveled stderr logger
//!
//! Status and error lines are contractual output (one line per terminal
//! outcome), so they go through this logger rather than `tracing`. Success
//! lines are green and warnings red when color is enabled; silent mode
//! suppresses everything.

use std::io::Write;
use std::sync::Mutex;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Thread-safe leveled logger writing to a single sink, stderr in production
pub struct LeveledLogger {
    silent: bool,
    color: bool,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl LeveledLogger {
    /// Logger writing to the given sink
    pub fn new(color: bool, writer: Box<dyn Write + Send>) -> Self {
        Self {
            silent: false,
            color,
            writer: Mutex::new(writer),
        }
    }

    /// Logger that swallows every line
    pub fn silent() -> Self {
        Self {
            silent: true,
            color: false,
            writer: Mutex::new(Box::new(std::io::sink())),
        }
    }

    /// Logger writing plain or colored lines to stderr
    pub fn stderr(color: bool) -> Self {
        Self::new(color, Box::new(std::io::stderr()))
    }

    /// Plain informational line
    pub fn info(&self, message: &str) {
        if !self.silent {
            self.write_line(message, None);
        }
    }

    /// Red line for errors and failure statuses
    pub fn warn(&self, message: &str) {
        if self.color {
            self.write_line(message, Some(RED));
        } else if !self.silent {
            self.write_line(message, None);
        }
    }

    /// Green line for success statuses
    pub fn success(&self, message: &str) {
        if self.color {
            self.write_line(message, Some(GREEN));
        } else if !self.silent {
            self.write_line(message, None);
        }
    }

    /// Log the terminal status line for a response
    pub fn log_response(&self, status: u16, message: &str) {
        if status < 400 {
            self.success(&format!("Response: {status} {message}"));
        } else {
            self.warn(&format!("Response: {status} {message}"));
        }
    }

    /// Log an error associated with a request or sink
    pub fn log_error(&self, message: &str, err: &dyn std::fmt::Display) {
        self.warn(&format!("{message} Error: {err}"));
    }

    fn write_line(&self, message: &str, color: Option<&str>) {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = match color {
            Some(code) => writeln!(writer, "{code}{message}{RESET}"),
            None => writeln!(writer, "{message}"),
        };
        if result.is_err() {
            // stderr is gone, nothing sensible left to do
            tracing::debug!("failed to write log line");
        }
    }
}

impl std::fmt::Debug for LeveledLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeveledLogger")
            .field("silent", &self.silent)
            .field("color", &self.color)
            .finish()
    }
}
