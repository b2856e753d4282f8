//! Point-in-time capture of the daemon's status fields.

use serde::Serialize;

use crate::response::fields::{AUDIO_PARTS, TIME_PARTS};
use crate::value::{PlaybackState, Record, Value};

/// Ordered `field → value` mapping taken from one `status` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    fields: Record,
}

impl StatusSnapshot {
    /// Wraps a parsed `status` record without normalising it.
    #[must_use]
    pub const fn from_record(fields: Record) -> Self {
        Self { fields }
    }

    /// Snapshot used when the daemon cannot be queried.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            fields: Record::new(),
        }
    }

    /// Fills absent composite fields with placeholder tuples.
    ///
    /// `time` becomes a pair and `audio` a triple of [`Value::Null`], so a
    /// song stopping registers as a change rather than a silent removal.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.fields.contains_key("time") {
            self.fields.push("time", Value::null_tuple(TIME_PARTS));
        }
        if !self.fields.contains_key("audio") {
            self.fields.push("audio", Value::null_tuple(AUDIO_PARTS));
        }
        self
    }

    /// Value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Mixer volume, absent when the daemon has no mixer.
    #[must_use]
    pub fn volume(&self) -> Option<i64> {
        self.get("volume").and_then(Value::as_int)
    }

    /// Player state.
    #[must_use]
    pub fn state(&self) -> Option<PlaybackState> {
        self.get("state").and_then(Value::as_state)
    }

    /// Fields in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter()
    }

    /// True when no field was captured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The underlying record.
    #[must_use]
    pub const fn as_record(&self) -> &Record {
        &self.fields
    }
}
