//! Change events and their subscribers.
//!
//! The set of events is closed: [`EventKind`] names every status field the
//! change notifier reports plus the synthetic `connection` event. Handlers are
//! registered per kind and run in registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use tracing::trace;

use crate::value::{Record, Value};

const EVENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::events");

/// Every event the change notifier can emit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    /// Connectivity changed; carries the new state.
    Connection,
    /// The current song changed; carries the song record.
    Song,
    /// Queue id of the current song.
    SongId,
    /// Queue position of the next song.
    NextSong,
    /// Queue id of the next song.
    NextSongId,
    /// Mixer volume.
    Volume,
    /// Repeat mode.
    Repeat,
    /// Random mode.
    Random,
    /// Single mode, including `oneshot`.
    Single,
    /// Consume mode, including `oneshot`.
    Consume,
    /// Queue version.
    Playlist,
    /// Queue length.
    PlaylistLength,
    /// Crossfade seconds.
    #[serde(rename = "xfade")]
    #[strum(serialize = "xfade")]
    Crossfade,
    /// `MixRamp` threshold in decibels.
    MixRampDb,
    /// `MixRamp` delay in seconds.
    MixRampDelay,
    /// Player state.
    State,
    /// Elapsed and total seconds, as two values.
    Time,
    /// Elapsed seconds with sub-second precision.
    Elapsed,
    /// Song duration.
    Duration,
    /// Instantaneous bitrate.
    Bitrate,
    /// Sample rate, bits and channels, as three values.
    Audio,
    /// Id of the running database update job.
    #[serde(rename = "updating_db")]
    #[strum(serialize = "updating_db")]
    UpdatingDb,
    /// Last daemon error message.
    Error,
    /// Partition the connection is bound to.
    Partition,
}

impl EventKind {
    /// Kind reported for a changed status field.
    ///
    /// Returns `None` for fields without an event, and for `connection`,
    /// which is not a status field.
    #[must_use]
    pub fn from_status_field(field: &str) -> Option<Self> {
        field
            .parse()
            .ok()
            .filter(|kind| *kind != Self::Connection)
    }
}

/// Data carried by an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// New connectivity.
    Connection(bool),
    /// The freshly fetched current song, `None` when nothing is current.
    Song(Option<Record>),
    /// Field value; composite fields contribute one value per part.
    Values(Vec<Value>),
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    kind: EventKind,
    payload: EventPayload,
}

impl Event {
    /// Connectivity changed.
    #[must_use]
    pub const fn connection(connected: bool) -> Self {
        Self {
            kind: EventKind::Connection,
            payload: EventPayload::Connection(connected),
        }
    }

    /// The current song changed.
    #[must_use]
    pub const fn song(song: Option<Record>) -> Self {
        Self {
            kind: EventKind::Song,
            payload: EventPayload::Song(song),
        }
    }

    /// A status field changed; tuples are splatted into separate values.
    #[must_use]
    pub fn field(kind: EventKind, value: &Value) -> Self {
        let values = match value {
            Value::Tuple(parts) => parts.clone(),
            scalar => vec![scalar.clone()],
        };
        Self {
            kind,
            payload: EventPayload::Values(values),
        }
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Event payload.
    #[must_use]
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Field values; empty for `connection` and `song` events.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        match &self.payload {
            EventPayload::Values(values) => values,
            EventPayload::Connection(_) | EventPayload::Song(_) => &[],
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.kind)?;
        match &self.payload {
            EventPayload::Connection(connected) => write!(formatter, " {connected}"),
            EventPayload::Song(Some(song)) => song
                .get("file")
                .map_or(Ok(()), |file| write!(formatter, " {file}")),
            EventPayload::Song(None) => formatter.write_str(" none"),
            EventPayload::Values(values) => {
                for value in values {
                    match value {
                        Value::Null => formatter.write_str(" -")?,
                        other => write!(formatter, " {other}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Errors raised while registering handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The name matches no [`EventKind`].
    #[error("unknown event '{name}'")]
    UnknownEvent {
        /// Name as given.
        name: String,
    },
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Subscribers keyed by event kind.
///
/// Clones share the same subscriber lists, so a registry can be handed to the
/// change notifier and still accept new handlers afterwards.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<Handler>>>>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.lock();
        let mut counts: Vec<(EventKind, usize)> = handlers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        counts.sort_by_key(|(kind, _)| kind.as_ref().to_owned());
        formatter
            .debug_struct("EventRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

impl EventRegistry {
    /// Creates a registry without handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the subscribers of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.lock().entry(kind).or_default().push(Arc::new(handler));
    }

    /// Parses `name` and appends `handler` to that kind.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEvent`] when `name` is not an event;
    /// nothing is registered in that case.
    pub fn on_named<F>(&self, name: &str, handler: F) -> Result<EventKind, EventError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let kind: EventKind = name.parse().map_err(|_| EventError::UnknownEvent {
            name: name.to_owned(),
        })?;
        self.on(kind, handler);
        Ok(kind)
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every handler of the event's kind in registration order.
    ///
    /// The lock is released before handlers run, so a handler may register
    /// further handlers.
    pub(crate) fn emit(&self, event: &Event) {
        let handlers = self.lock().get(&event.kind).cloned().unwrap_or_default();
        trace!(
            target: EVENTS_TARGET,
            event = %event.kind,
            handlers = handlers.len(),
            "dispatching event"
        );
        for handler in handlers {
            handler(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
