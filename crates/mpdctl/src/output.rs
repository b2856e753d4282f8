//! Rendering of parsed responses and change events.

use std::io::{self, Write};

use clap::ValueEnum;
use mpdctl_client::{Event, ParsedResult, Record};

use crate::AppError;

/// Output format selection for command responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human output on a terminal, JSON otherwise.
    Auto,
    /// Always print `key: value` lines.
    Human,
    /// Always print JSON.
    Json,
}

/// Output format after resolving `auto`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedOutputFormat {
    /// `key: value` lines.
    Human,
    /// One JSON document per response or event.
    Json,
}

impl OutputFormat {
    /// Resolves `auto` by whether stdout is a terminal.
    #[must_use]
    pub const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Auto if stdout_is_terminal => ResolvedOutputFormat::Human,
            Self::Auto | Self::Json => ResolvedOutputFormat::Json,
            Self::Human => ResolvedOutputFormat::Human,
        }
    }
}

/// Writes `result` as `key: value` lines.
///
/// Records in a list are separated by a blank line; scalar lists print one
/// value per line; an empty result prints nothing.
///
/// # Errors
///
/// Propagates write failures.
pub fn render_human<W: Write>(result: &ParsedResult, out: &mut W) -> io::Result<()> {
    match result {
        ParsedResult::Empty => Ok(()),
        ParsedResult::Record(record) => write_record(record, out),
        ParsedResult::RecordList(records) => {
            for (index, record) in records.iter().enumerate() {
                if index > 0 {
                    writeln!(out)?;
                }
                write_record(record, out)?;
            }
            Ok(())
        }
        ParsedResult::ScalarList(values) => {
            for value in values {
                writeln!(out, "{value}")?;
            }
            Ok(())
        }
    }
}

fn write_record<W: Write>(record: &Record, out: &mut W) -> io::Result<()> {
    for (key, value) in record.iter() {
        writeln!(out, "{key}: {value}")?;
    }
    Ok(())
}

pub(crate) fn write_response<W: Write>(
    result: &ParsedResult,
    format: ResolvedOutputFormat,
    out: &mut W,
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Human => render_human(result, out).map_err(AppError::WriteOutput)?,
        ResolvedOutputFormat::Json => {
            serde_json::to_writer(&mut *out, result).map_err(AppError::SerialiseOutput)?;
            writeln!(out).map_err(AppError::WriteOutput)?;
        }
    }
    out.flush().map_err(AppError::WriteOutput)
}

pub(crate) fn write_event<W: Write>(
    event: &Event,
    format: ResolvedOutputFormat,
    out: &mut W,
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Human => writeln!(out, "{event}").map_err(AppError::WriteOutput)?,
        ResolvedOutputFormat::Json => {
            serde_json::to_writer(&mut *out, event).map_err(AppError::SerialiseOutput)?;
            writeln!(out).map_err(AppError::WriteOutput)?;
        }
    }
    out.flush().map_err(AppError::WriteOutput)
}

#[cfg(test)]
mod tests {
    use mpdctl_client::{PlaybackState, Value};
    use rstest::rstest;

    use super::*;

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    fn human(result: &ParsedResult) -> String {
        let mut buffer = Vec::new();
        render_human(result, &mut buffer).expect("render");
        String::from_utf8(buffer).expect("utf8")
    }

    #[rstest]
    #[case::terminal(OutputFormat::Auto, true, ResolvedOutputFormat::Human)]
    #[case::redirected(OutputFormat::Auto, false, ResolvedOutputFormat::Json)]
    #[case::forced_human(OutputFormat::Human, false, ResolvedOutputFormat::Human)]
    #[case::forced_json(OutputFormat::Json, true, ResolvedOutputFormat::Json)]
    fn resolves_auto_by_terminal(
        #[case] format: OutputFormat,
        #[case] terminal: bool,
        #[case] expected: ResolvedOutputFormat,
    ) {
        assert_eq!(format.resolve(terminal), expected);
    }

    #[test]
    fn record_renders_typed_values() {
        let status = ParsedResult::Record(record(&[
            ("volume", Value::Int(40)),
            ("repeat", Value::Bool(true)),
            ("state", Value::State(PlaybackState::Pause)),
            ("time", Value::Tuple(vec![Value::Int(3), Value::Int(200)])),
        ]));

        assert_eq!(
            human(&status),
            "volume: 40\nrepeat: 1\nstate: pause\ntime: 3:200\n"
        );
    }

    #[test]
    fn record_lists_are_separated_by_blank_lines() {
        let songs = ParsedResult::RecordList(vec![
            record(&[("file", Value::Text(String::from("a.flac")))]),
            record(&[("file", Value::Text(String::from("b.flac")))]),
        ]);
        assert_eq!(human(&songs), "file: a.flac\n\nfile: b.flac\n");
    }

    #[test]
    fn scalar_lists_print_one_value_per_line() {
        let artists = ParsedResult::ScalarList(vec![String::from("Ash"), String::from("Bush")]);
        assert_eq!(human(&artists), "Ash\nBush\n");
        assert_eq!(human(&ParsedResult::Empty), "");
    }

    #[test]
    fn json_response_is_tagged() {
        let mut buffer = Vec::new();
        write_response(
            &ParsedResult::Record(record(&[("volume", Value::Int(5))])),
            ResolvedOutputFormat::Json,
            &mut buffer,
        )
        .expect("write");
        let json: serde_json::Value = serde_json::from_slice(&buffer).expect("json");
        assert_eq!(
            json,
            serde_json::json!({"kind": "record", "data": {"volume": 5}})
        );
    }

    #[test]
    fn events_render_one_line_each() {
        let mut buffer = Vec::new();
        write_event(
            &Event::field(mpdctl_client::EventKind::Volume, &Value::Int(30)),
            ResolvedOutputFormat::Human,
            &mut buffer,
        )
        .expect("write");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "volume 30\n");
    }
}
