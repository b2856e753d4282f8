//! Shared configuration for the mpdctl client and command-line tool.
//!
//! Settings are layered with [`ortho_config`]: built-in defaults, an optional
//! configuration file (`--config-path` or `MPDCTL_CONFIG_PATH`), environment
//! variables prefixed with `MPDCTL_`, and finally command-line flags.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod socket;

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_RECONNECT_BACKOFF_MS, default_daemon_host, default_daemon_port, default_log_filter,
    default_log_filter_string, default_log_format, default_poll_interval_ms,
    default_reconnect_backoff_ms,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError};

/// Resolved client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "MPDCTL")]
pub struct Config {
    /// Host name, address, local socket path, or endpoint URL of the daemon.
    #[ortho_config(default = default_daemon_host())]
    pub daemon_host: String,
    /// TCP port used when the host is not a local socket.
    #[ortho_config(default = default_daemon_port())]
    pub daemon_port: u16,
    /// Password sent right after the handshake, when set.
    pub password: Option<String>,
    /// Sleep between two change-notifier polls, in milliseconds.
    #[ortho_config(default = default_poll_interval_ms())]
    pub poll_interval_ms: u64,
    /// Sleep before the change notifier reconnects, in milliseconds.
    #[ortho_config(default = default_reconnect_backoff_ms())]
    pub reconnect_backoff_ms: u64,
    /// Tracing filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_host: default_daemon_host(),
            daemon_port: default_daemon_port(),
            password: None,
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint derived from the configured host and port.
    ///
    /// The host may also be a `unix://` or `tcp://` URL. A plain host is
    /// checked against the filesystem on every call so a socket that appears
    /// after start-up is picked up by the next connect.
    ///
    /// # Errors
    ///
    /// Returns [`SocketParseError`] when the host is an unusable URL.
    pub fn daemon_socket(&self) -> Result<SocketEndpoint, SocketParseError> {
        SocketEndpoint::detect(&self.daemon_host, self.daemon_port)
    }

    /// Password to authenticate with, if any.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|value| !value.is_empty())
    }

    /// Interval between change-notifier polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before the change notifier attempts a reconnect.
    #[must_use]
    pub const fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
