//! Client protocol engine for the Music Player Daemon.
//!
//! The crate turns the daemon's line protocol into typed Rust values:
//!
//! - [`Command`] frames one request line, quoting arguments as needed.
//! - [`response`] reads lines up to the `OK`/`ACK` terminator and coerces
//!   `key: value` pairs into a [`ParsedResult`]; `ACK` lines decode into a
//!   [`ServerError`].
//! - [`ConnectionManager`] owns the stream, validates the greeting and
//!   detects broken connections.
//! - [`Client`] moves a connection manager onto a worker thread and exposes
//!   it through a cloneable handle; concurrent callers are served one command
//!   at a time in submission order.
//! - [`ChangeNotifier`] polls `status`, diffs snapshots, and dispatches
//!   [`Event`]s to handlers registered on an [`EventRegistry`].
//!
//! No operation has a timeout: a daemon that stops answering blocks the
//! caller until the stream fails.

mod channel;
mod command;
mod connection;
mod error;
mod events;
mod notifier;
pub mod response;
mod status;
mod transport;
mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use channel::Client;
pub use command::{Argument, Command, ResponseShape, quote};
pub use connection::ConnectionManager;
pub use error::{AckKind, ClientError, ServerError};
pub use events::{Event, EventError, EventKind, EventPayload, EventRegistry};
pub use notifier::{
    CancellationToken, ChangeNotifier, FieldChange, NotifierError, NotifierSettings,
    NotifierState, diff_snapshots,
};
pub use response::{RawResponse, decode_ack, parse, read_raw, read_response};
pub use status::StatusSnapshot;
pub use value::{ParsedResult, PlaybackState, Record, Value};
