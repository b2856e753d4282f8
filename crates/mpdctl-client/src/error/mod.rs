//! Errors raised by the protocol engine.
//!
//! Every fallible client operation returns [`ClientError`]. I/O errors are
//! wrapped in `Arc` so the enum stays `Clone` and satisfies the
//! `result_large_err` Clippy lint.

use std::io;
use std::sync::Arc;

use mpdctl_config::SocketParseError;
use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// A command was issued while no connection is established.
    #[error("not connected to the daemon")]
    NotConnected,

    /// `connect` was called while a connection is already established.
    #[error("already connected to the daemon")]
    AlreadyConnected,

    /// The greeting line was missing or did not identify the daemon.
    #[error("unexpected greeting from daemon: {greeting:?}")]
    Handshake {
        /// Greeting line as received, empty when the stream closed first.
        greeting: String,
    },

    /// The configured daemon host is an unusable endpoint URL.
    #[error("invalid daemon endpoint: {0}")]
    Endpoint(#[from] SocketParseError),

    /// The daemon host name could not be resolved.
    #[error("failed to resolve daemon address {endpoint}: {source}")]
    Resolve {
        /// Endpoint being resolved.
        endpoint: String,
        /// Underlying resolver error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The stream to the daemon could not be opened.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        /// Endpoint being connected to.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The platform cannot open local sockets.
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),

    /// Writing a command or reading its response failed mid-exchange.
    ///
    /// The connection state is cleared; later commands fail with
    /// [`ClientError::NotConnected`] until the next `connect`.
    #[error("connection to the daemon was lost: {source}")]
    ConnectionLost {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The daemon answered with an `ACK` line.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A response line violated the line grammar.
    #[error("malformed response line {line:?}: {reason}")]
    Malformed {
        /// Offending line.
        line: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The command could not be framed as a single request line.
    #[error("refusing to send command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },

    /// The thread owning the connection could not be started.
    #[error("failed to start the command channel worker: {source}")]
    WorkerSpawn {
        /// Underlying spawn error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The thread owning the connection is no longer running.
    #[error("the command channel worker has stopped")]
    WorkerStopped,
}

impl ClientError {
    pub(crate) fn connection_lost(source: io::Error) -> Self {
        Self::ConnectionLost {
            source: Arc::new(source),
        }
    }

    pub(crate) fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Returns the decoded `ACK` when the daemon rejected the command.
    #[must_use]
    pub const fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(error) => Some(error),
            _ => None,
        }
    }
}

/// A decoded `ACK [<code>@<index>] {<command>} <message>` line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("daemon rejected '{command}' (code {code}, index {command_index}): {message}")]
pub struct ServerError {
    /// Numeric error code.
    pub code: u32,
    /// Position of the failing command within a command list.
    pub command_index: u32,
    /// Name of the command the daemon rejected.
    pub command: String,
    /// Human-readable message, verbatim.
    pub message: String,
}

impl ServerError {
    /// Classifies the numeric code.
    #[must_use]
    pub const fn kind(&self) -> AckKind {
        AckKind::from_code(self.code)
    }
}

/// Error codes the daemon documents for `ACK` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// The command is only valid inside a command list.
    NotList,
    /// Bad or missing argument.
    Argument,
    /// Wrong password.
    Password,
    /// The connection lacks permission for the command.
    Permission,
    /// Unknown command.
    Unknown,
    /// The requested object does not exist.
    NoExist,
    /// The playlist reached its maximum length.
    PlaylistMax,
    /// Daemon-side system error.
    System,
    /// A playlist could not be loaded.
    PlaylistLoad,
    /// A database update is already running.
    UpdateAlready,
    /// The player is not in the required state.
    PlayerSync,
    /// The object already exists.
    Exist,
    /// A code this client does not know.
    Other(u32),
}

impl AckKind {
    /// Maps a numeric code to its kind.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::NotList,
            2 => Self::Argument,
            3 => Self::Password,
            4 => Self::Permission,
            5 => Self::Unknown,
            50 => Self::NoExist,
            51 => Self::PlaylistMax,
            52 => Self::System,
            53 => Self::PlaylistLoad,
            54 => Self::UpdateAlready,
            55 => Self::PlayerSync,
            56 => Self::Exist,
            other => Self::Other(other),
        }
    }
}
