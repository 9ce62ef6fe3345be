//! Delimited (URL-per-line) input parsing
//!
//! Each line is a TAB-separated record with RFC 4180 quoting: the first field
//! is the URL, remaining fields become the pass-through context. When a
//! data-template is configured, the space-separated tokens after the URL on
//! the raw line feed the template to form the request body.

use serde_json::Value;

use super::template;
use crate::error::{Error, Result};
use crate::request::RequestDescriptor;

/// Parse one raw delimited line into a descriptor.
///
/// Returns `Ok(None)` for blank lines. Malformed quoting aborts the stream
/// with a parse error naming the line.
pub fn parse_line(
    line: &str,
    line_number: u64,
    data_template: Option<&str>,
) -> Result<Option<RequestDescriptor>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    // A template switches the line to whitespace tokens: the first token is
    // the URL and the rest feed the template slots.
    if let Some(tmpl) = data_template {
        let mut tokens = line.split_whitespace();
        let Some(url) = tokens.next() else {
            return Ok(None);
        };
        let tokens: Vec<&str> = tokens.collect();

        let mut descriptor = RequestDescriptor::url(url);
        descriptor.body = Some(template::render(tmpl, &tokens).into_bytes());
        return Ok(Some(descriptor));
    }

    let fields = split_record(line, line_number)?;
    let Some((url, context_fields)) = fields.split_first() else {
        return Ok(None);
    };

    let context = if context_fields.is_empty() {
        None
    } else {
        Some(Value::Array(
            context_fields
                .iter()
                .map(|field| Value::String(field.clone()))
                .collect(),
        ))
    };

    let mut descriptor = RequestDescriptor::url(url.clone());
    descriptor.context = context;
    Ok(Some(descriptor))
}

/// Split one line into TSV fields with RFC 4180 quoting rules.
///
/// A field starting with `"` runs to its closing quote, with `""` as the
/// escape; a closing quote must be followed by a TAB or the end of the
/// line. Malformed quoting reports the offending column.
fn split_record(line: &str, line_number: u64) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = line.char_indices().peekable();

    loop {
        let mut field = String::new();

        if let Some(&(start, '"')) = chars.peek() {
            chars.next();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c != '"' {
                    field.push(c);
                    continue;
                }
                match chars.peek() {
                    Some(&(_, '"')) => {
                        chars.next();
                        field.push('"');
                    }
                    Some(&(_, '\t')) | None => {
                        closed = true;
                        break;
                    }
                    Some(&(column, _)) => {
                        return Err(Error::parse(
                            line_number,
                            format!("extraneous quote in field at column {}", column + 1),
                        ));
                    }
                }
            }
            if !closed {
                return Err(Error::parse(
                    line_number,
                    format!("unterminated quoted field at column {}", start + 1),
                ));
            }
        } else {
            while let Some(&(column, c)) = chars.peek() {
                if c == '\t' {
                    break;
                }
                if c == '"' {
                    return Err(Error::parse(
                        line_number,
                        format!("bare quote in field at column {}", column + 1),
                    ));
                }
                field.push(c);
                chars.next();
            }
        }

        fields.push(field);
        match chars.next() {
            Some((_, '\t')) => {}
            _ => break,
        }
    }

    Ok(fields)
}
