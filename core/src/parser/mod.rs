//! Input parsing: a byte stream in, a lazy sequence of descriptors out
//!
//! The stream's mode is decided once, by peeking the first non-empty byte:
//! `{` means JSON-Lines, anything else means delimited URL-per-line input.
//! A stream never mixes modes. Descriptors come out in input order; any
//! reordering happens downstream.

mod delimited;
mod json_lines;
mod template;

pub use template::render as render_template;

use std::io::BufRead;

use crate::error::{Error, Result};
use crate::request::RequestDescriptor;

/// The two input stream formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// TAB-separated URL-per-line records
    Delimited,
    /// One JSON object per line
    JsonLines,
}

/// Peek the first non-whitespace byte without consuming content lines.
///
/// Whitespace-only chunks are consumed so detection can make progress on
/// streams that open with blank lines. An empty stream counts as delimited.
pub fn detect_input_kind<R: BufRead>(reader: &mut R) -> std::io::Result<InputKind> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(InputKind::Delimited);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(index) => {
                let kind = if buf[index] == b'{' {
                    InputKind::JsonLines
                } else {
                    InputKind::Delimited
                };
                return Ok(kind);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Lazy, single-pass stream of descriptors over an input reader
///
/// Terminates on EOF or on the first parse error; both modes abort the
/// stream when a line is malformed. Line numbers in errors count from the
/// first line mode detection left in the stream, so blank lines consumed
/// during detection are not counted.
pub struct DescriptorStream<R: BufRead> {
    reader: R,
    kind: Option<InputKind>,
    data_template: Option<String>,
    line_number: u64,
    line: String,
    done: bool,
}

impl<R: BufRead> DescriptorStream<R> {
    /// Stream over `reader`, rendering bodies with `data_template` when set
    pub fn new(reader: R, data_template: Option<String>) -> Self {
        Self {
            reader,
            kind: None,
            data_template,
            line_number: 0,
            line: String::new(),
            done: false,
        }
    }

    /// The detected input kind, once the first record has been read
    pub fn kind(&self) -> Option<InputKind> {
        self.kind
    }

    fn detect(&mut self) -> Result<InputKind> {
        match self.kind {
            Some(kind) => Ok(kind),
            None => {
                let kind = detect_input_kind(&mut self.reader)?;
                self.kind = Some(kind);
                Ok(kind)
            }
        }
    }

    fn next_descriptor(&mut self) -> Result<Option<RequestDescriptor>> {
        let kind = self.detect()?;

        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.line.trim_end_matches(['\n', '\r']);

            let parsed = match kind {
                InputKind::Delimited => delimited::parse_line(
                    line,
                    self.line_number,
                    self.data_template.as_deref(),
                )?,
                InputKind::JsonLines => json_lines::parse_line(line, self.line_number)?,
            };

            if let Some(descriptor) = parsed {
                return Ok(Some(descriptor));
            }
        }
    }
}

impl<R: BufRead> Iterator for DescriptorStream<R> {
    type Item = Result<RequestDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_descriptor() {
            Ok(Some(descriptor)) => Some(Ok(descriptor)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
