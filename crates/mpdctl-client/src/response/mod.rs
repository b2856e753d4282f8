//! Response reading and parsing.
//!
//! A response is every line the daemon sends after a request up to and
//! including its terminator: `OK` on success or a single `ACK` line on
//! failure. [`read_response`] always consumes the whole response, even when
//! an earlier line is unusable, so the next request starts on a clean stream.

use std::collections::HashSet;
use std::io::{self, BufRead};

use tracing::trace;

use crate::command::ResponseShape;
use crate::value::{ParsedResult, Record};
use crate::ClientError;

mod ack;
pub(crate) mod fields;

pub use ack::decode_ack;

const RESPONSE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::response");

/// Lines collected before an `OK` terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    lines: Vec<String>,
}

impl RawResponse {
    /// Wraps already collected lines.
    #[must_use]
    pub const fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// The collected lines, terminator excluded.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Parses the lines according to `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Malformed`] when any line breaks the
    /// `key: value` grammar or fails coercion.
    pub fn parse(&self, shape: &ResponseShape) -> Result<ParsedResult, ClientError> {
        parse(&self.lines, shape)
    }
}

/// Reads one line without its terminator.
///
/// Returns `Ok(None)` at end of stream. A final line with no newline counts as
/// a lost connection because the daemon always terminates its lines.
pub(crate) fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, ClientError> {
    let mut buffer = Vec::new();
    let read = reader
        .read_until(b'\n', &mut buffer)
        .map_err(ClientError::connection_lost)?;
    if read == 0 {
        return Ok(None);
    }
    if buffer.pop() != Some(b'\n') {
        return Err(ClientError::connection_lost(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended inside a response line",
        )));
    }
    if buffer.last() == Some(&b'\r') {
        buffer.pop();
    }
    Ok(Some(buffer))
}

/// Reads lines up to the terminator.
///
/// # Errors
///
/// - [`ClientError::Server`] when the terminator is an `ACK` line.
/// - [`ClientError::ConnectionLost`] when the stream ends or fails first.
/// - [`ClientError::Malformed`] for a line that is not UTF-8 or an `ACK` that
///   does not decode. The first error wins; later lines are still consumed.
pub fn read_raw<R: BufRead>(reader: &mut R) -> Result<RawResponse, ClientError> {
    let mut lines = Vec::new();
    let mut first_error: Option<ClientError> = None;

    loop {
        let Some(bytes) = read_line(reader)? else {
            return Err(ClientError::connection_lost(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed before the response terminator",
            )));
        };
        let line = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(error) => {
                let lossy = String::from_utf8_lossy(error.as_bytes()).into_owned();
                first_error.get_or_insert_with(|| {
                    ClientError::malformed(lossy, "line is not valid UTF-8")
                });
                continue;
            }
        };

        if line == "OK" {
            trace!(target: RESPONSE_TARGET, lines = lines.len(), "response terminated by OK");
            return first_error.map_or(Ok(RawResponse::new(lines)), Err);
        }
        if line.starts_with("ACK") {
            trace!(target: RESPONSE_TARGET, line = %line, "response terminated by ACK");
            let decoded = decode_ack(&line).map(ClientError::Server);
            return Err(first_error.unwrap_or_else(|| match decoded {
                Ok(error) | Err(error) => error,
            }));
        }
        lines.push(line);
    }
}

/// Reads a full response and parses it with `shape`.
///
/// # Errors
///
/// See [`read_raw`] and [`RawResponse::parse`].
pub fn read_response<R: BufRead>(
    reader: &mut R,
    shape: &ResponseShape,
) -> Result<ParsedResult, ClientError> {
    read_raw(reader)?.parse(shape)
}

/// Parses collected lines according to `shape`.
///
/// Zero lines always yield [`ParsedResult::Empty`].
///
/// # Errors
///
/// Returns [`ClientError::Malformed`] on the first line that breaks the
/// `key: value` grammar or fails coercion. No partial result is returned.
pub fn parse(lines: &[String], shape: &ResponseShape) -> Result<ParsedResult, ClientError> {
    if lines.is_empty() {
        return Ok(ParsedResult::Empty);
    }

    let pairs = lines
        .iter()
        .map(|line| split_line(line))
        .collect::<Result<Vec<_>, _>>()?;

    match shape {
        ResponseShape::ScalarList => Ok(ParsedResult::ScalarList(
            pairs.into_iter().map(|(_, raw)| raw.to_owned()).collect(),
        )),
        ResponseShape::Record => build_record(&pairs).map(ParsedResult::Record),
        ResponseShape::RecordList { boundaries } => {
            let keys: Vec<&str> = boundaries.iter().map(String::as_str).collect();
            build_records(&pairs, &keys).map(ParsedResult::RecordList)
        }
        ResponseShape::Auto if has_repeated_key(&pairs) => {
            let boundary = pairs.first().map(|(key, _)| key.as_str()).unwrap_or_default();
            build_records(&pairs, &[boundary]).map(ParsedResult::RecordList)
        }
        ResponseShape::Auto => build_record(&pairs).map(ParsedResult::Record),
    }
}

fn split_line(line: &str) -> Result<(String, &str), ClientError> {
    let (key, value) = match line.split_once(": ") {
        Some(pair) => pair,
        None => match line.strip_suffix(':') {
            Some(bare) => (bare, ""),
            None => return Err(ClientError::malformed(line, "expected 'key: value'")),
        },
    };
    if key.is_empty() {
        return Err(ClientError::malformed(line, "empty field name"));
    }
    Ok((fields::normalise_key(key), value))
}

fn has_repeated_key(pairs: &[(String, &str)]) -> bool {
    let mut seen = HashSet::new();
    pairs.iter().any(|(key, _)| !seen.insert(key.as_str()))
}

fn build_record(pairs: &[(String, &str)]) -> Result<Record, ClientError> {
    let mut record = Record::new();
    for (key, raw) in pairs {
        record.push(key.clone(), fields::coerce(key, raw)?);
    }
    Ok(record)
}

fn build_records(
    pairs: &[(String, &str)],
    boundaries: &[&str],
) -> Result<Vec<Record>, ClientError> {
    let mut records = Vec::new();
    let mut current = Record::new();
    for (key, raw) in pairs {
        if boundaries.contains(&key.as_str()) && !current.is_empty() {
            records.push(std::mem::take(&mut current));
        }
        current.push(key.clone(), fields::coerce(key, raw)?);
    }
    if !current.is_empty() {
        records.push(current);
    }
    Ok(records)
}
