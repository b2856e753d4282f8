//! Per-field type coercion.

use std::str::FromStr;

use crate::ClientError;
use crate::value::{PlaybackState, Value};

/// Declared type of a response field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Int,
    IntOrText,
    Float,
    Toggle,
    ToggleOrOneshot,
    State,
    Time,
    Audio,
    Text,
}

impl FieldKind {
    pub(crate) fn of(key: &str) -> Self {
        match key {
            "volume" | "playlistlength" | "song" | "songid" | "nextsong" | "nextsongid"
            | "bitrate" | "xfade" | "updating_db" | "pos" | "id" | "prio" | "outputid"
            | "artists" | "albums" | "songs" | "uptime" | "playtime" | "db_playtime"
            | "db_update" => Self::Int,
            "playlist" => Self::IntOrText,
            "elapsed" | "duration" | "mixrampdb" | "mixrampdelay" => Self::Float,
            "repeat" | "random" | "outputenabled" => Self::Toggle,
            "single" | "consume" => Self::ToggleOrOneshot,
            "state" => Self::State,
            "time" => Self::Time,
            "audio" => Self::Audio,
            _ => Self::Text,
        }
    }
}

/// Lowercases a key and replaces `-` with `_`.
pub(crate) fn normalise_key(key: &str) -> String {
    key.chars()
        .map(|ch| if ch == '-' { '_' } else { ch.to_ascii_lowercase() })
        .collect()
}

/// Converts the raw text of `key` into its typed value.
pub(crate) fn coerce(key: &str, raw: &str) -> Result<Value, ClientError> {
    match FieldKind::of(key) {
        FieldKind::Int => parse_int(key, raw),
        FieldKind::IntOrText => Ok(raw
            .parse::<i64>()
            .map_or_else(|_| Value::Text(raw.to_owned()), Value::Int)),
        FieldKind::Float => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| mismatch(key, raw, "a number")),
        FieldKind::Toggle => parse_toggle(key, raw),
        FieldKind::ToggleOrOneshot if raw == "oneshot" => Ok(Value::Text(raw.to_owned())),
        FieldKind::ToggleOrOneshot => parse_toggle(key, raw),
        FieldKind::State => PlaybackState::from_str(raw)
            .map(Value::State)
            .map_err(|_| mismatch(key, raw, "play, pause or stop")),
        FieldKind::Time => parse_time(key, raw),
        FieldKind::Audio => parse_audio(key, raw),
        FieldKind::Text => Ok(Value::Text(raw.to_owned())),
    }
}

fn parse_int(key: &str, raw: &str) -> Result<Value, ClientError> {
    raw.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| mismatch(key, raw, "an integer"))
}

fn parse_toggle(key: &str, raw: &str) -> Result<Value, ClientError> {
    match raw {
        "0" => Ok(Value::Bool(false)),
        "1" => Ok(Value::Bool(true)),
        _ => Err(mismatch(key, raw, "0 or 1")),
    }
}

// Status reports `elapsed:total`; song records carry a bare duration.
fn parse_time(key: &str, raw: &str) -> Result<Value, ClientError> {
    match raw.split_once(':') {
        Some((elapsed, total)) => Ok(Value::Tuple(vec![
            parse_int(key, elapsed)?,
            parse_int(key, total)?,
        ])),
        None => parse_int(key, raw),
    }
}

// `rate:bits:channels`; DSD and float formats use tokens such as `dsd64` or
// `f`, which stay text.
fn parse_audio(key: &str, raw: &str) -> Result<Value, ClientError> {
    let mut parts: Vec<Value> = raw
        .split(':')
        .map(|part| {
            part.parse::<i64>()
                .map_or_else(|_| Value::Text(part.to_owned()), Value::Int)
        })
        .collect();
    if parts.len() > AUDIO_PARTS {
        return Err(mismatch(key, raw, "rate:bits:channels"));
    }
    parts.resize(AUDIO_PARTS, Value::Null);
    Ok(Value::Tuple(parts))
}

pub(crate) const TIME_PARTS: usize = 2;
pub(crate) const AUDIO_PARTS: usize = 3;

fn mismatch(key: &str, raw: &str, expected: &str) -> ClientError {
    ClientError::malformed(
        format!("{key}: {raw}"),
        format!("expected {expected} for field '{key}'"),
    )
}
