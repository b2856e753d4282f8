//! Typed values produced by the response parser.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use strum::{Display, EnumString};

/// Player state reported by the `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlaybackState {
    /// A song is playing.
    Play,
    /// Playback is paused.
    Pause,
    /// Playback is stopped.
    Stop,
}

/// A single typed field value.
///
/// Composite fields (`time`, `audio`) are tuples whose absent parts are
/// [`Value::Null`], so two snapshots always have the same shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Placeholder for a missing composite part.
    Null,
    /// A `0`/`1` toggle.
    Bool(bool),
    /// An integer field.
    Int(i64),
    /// A floating-point field.
    Float(f64),
    /// The player state.
    State(PlaybackState),
    /// Verbatim text.
    Text(String),
    /// A fixed-size composite such as `elapsed:total`.
    Tuple(Vec<Value>),
}

impl Value {
    /// Returns the integer payload.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float payload, widening integers.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "integer fields widened to f64 stay far below 2^52"
    )]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns the toggle payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the player state payload.
    #[must_use]
    pub const fn as_state(&self) -> Option<PlaybackState> {
        match self {
            Self::State(state) => Some(*state),
            _ => None,
        }
    }

    /// Returns the text payload.
    #[must_use]
    pub const fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns the parts of a composite value.
    #[must_use]
    pub const fn as_tuple(&self) -> Option<&[Self]> {
        match self {
            Self::Tuple(parts) => Some(parts.as_slice()),
            _ => None,
        }
    }

    /// True for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn null_tuple(len: usize) -> Self {
        Self::Tuple(vec![Self::Null; len])
    }
}

// Floats compare bit-for-bit: the daemon reports `nan` for unset mixramp
// values and that must not register as a change on every poll.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left.to_bits() == right.to_bits(),
            (Self::State(left), Self::State(right)) => left == right,
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Tuple(left), Self::Tuple(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(value) => write!(formatter, "{}", u8::from(*value)),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value}"),
            Self::State(state) => write!(formatter, "{state}"),
            Self::Text(text) => formatter.write_str(text),
            Self::Tuple(parts) => {
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(":")?;
                    }
                    write!(formatter, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

/// One logical entity: an ordered list of `field → value` pairs.
///
/// Keys may repeat (multi-valued tags such as several `artist` lines);
/// [`Record::get`] returns the first occurrence and [`Record::get_all`] every
/// one of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field.
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.fields.push((key.into(), value));
    }

    /// Replaces every occurrence of `key` with a single value, or appends it.
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.retain(|(existing, _)| existing != key);
        self.fields.push((key.to_owned(), value));
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Every value stored under `key`, in response order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.fields
            .iter()
            .filter(move |(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// True when `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the fields in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of stored fields, counting repeats.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record holds no field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

// Serialised as a map in first-appearance order; repeated keys collapse into
// an array.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.fields {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            let values: Vec<&Value> = self.get_all(key).collect();
            match values.as_slice() {
                [single] => map.serialize_entry(key, single)?,
                many => map.serialize_entry(key, many)?,
            }
        }
        map.end()
    }
}

/// Typed result of one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ParsedResult {
    /// Bare `OK`.
    Empty,
    /// A single entity.
    Record(Record),
    /// Several entities split on their boundary key.
    RecordList(Vec<Record>),
    /// Raw values, e.g. a list of names.
    ScalarList(Vec<String>),
}

impl ParsedResult {
    /// Converts into a single record; `Empty` yields an empty record.
    ///
    /// Lists yield their first record.
    #[must_use]
    pub fn into_record(self) -> Record {
        match self {
            Self::Record(record) => record,
            Self::RecordList(records) => records.into_iter().next().unwrap_or_default(),
            Self::Empty | Self::ScalarList(_) => Record::new(),
        }
    }

    /// Converts into a list of records.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Record(record) => vec![record],
            Self::RecordList(records) => records,
            Self::Empty | Self::ScalarList(_) => Vec::new(),
        }
    }

    /// Converts into raw values; records contribute every field value.
    #[must_use]
    pub fn into_scalars(self) -> Vec<String> {
        match self {
            Self::ScalarList(values) => values,
            Self::Record(record) => record.iter().map(|(_, value)| value.to_string()).collect(),
            Self::RecordList(records) => records
                .iter()
                .flat_map(|record| record.iter().map(|(_, value)| value.to_string()))
                .collect(),
            Self::Empty => Vec::new(),
        }
    }

    /// True for [`ParsedResult::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
