use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;

/// Port the daemon listens on when no other port is configured.
pub const DEFAULT_PORT: u16 = 6600;

/// Host used when no local socket is available.
pub const DEFAULT_HOST: &str = "localhost";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Sleep between two change-notifier polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Sleep before the change notifier attempts a reconnect, in milliseconds.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 2_000;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default daemon port.
#[must_use]
pub const fn default_daemon_port() -> u16 {
    DEFAULT_PORT
}

/// Default poll interval in milliseconds.
#[must_use]
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default reconnect backoff in milliseconds.
#[must_use]
pub const fn default_reconnect_backoff_ms() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}

/// Computes the default daemon host.
///
/// The daemon publishes a local socket at `$XDG_RUNTIME_DIR/mpd/socket` on
/// most desktop installations; when that file exists it wins over TCP.
#[must_use]
pub fn default_daemon_host() -> String {
    local_socket_candidate()
        .filter(|path| path.exists())
        .and_then(|path| path.to_str().map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_HOST.to_owned())
}

#[cfg(unix)]
fn local_socket_candidate() -> Option<PathBuf> {
    runtime_dir().map(|dir| dir.join("mpd").join("socket"))
}

#[cfg(not(unix))]
fn local_socket_candidate() -> Option<PathBuf> {
    None
}
