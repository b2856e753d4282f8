//! Connection lifecycle: handshake, authentication, command exchange.
//!
//! [`ConnectionManager`] exclusively owns the stream to the daemon. It is a
//! synchronous building block; concurrent callers go through
//! [`crate::Client`], which moves the manager onto a dedicated thread.

use std::io::{BufReader, Write};

use mpdctl_config::SocketEndpoint;
use tracing::{debug, info, trace, warn};

use crate::command::Command;
use crate::response::{read_line, read_response};
use crate::transport::{self, Stream};
use crate::value::ParsedResult;
use crate::ClientError;

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Leading token of the greeting line; the daemon name and version follow.
const GREETING_OK: &str = "OK";

struct Session {
    reader: BufReader<Stream>,
    writer: Stream,
    version: String,
}

/// Owns at most one live connection to the daemon.
///
/// The protocol version is known exactly when a stream is open.
pub struct ConnectionManager {
    endpoint: SocketEndpoint,
    password: Option<String>,
    session: Option<Session>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("authenticates", &self.password.is_some())
            .field("version", &self.version())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager for `endpoint`.
    #[must_use]
    pub const fn new(endpoint: SocketEndpoint) -> Self {
        Self {
            endpoint,
            password: None,
            session: None,
        }
    }

    /// Authenticates with `password` after every handshake.
    #[must_use]
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|value| !value.is_empty());
        self
    }

    /// Endpoint the manager connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Protocol version announced by the daemon, while connected.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.version.as_str())
    }

    /// Opens the stream, validates the greeting and authenticates.
    ///
    /// Returns the protocol version.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyConnected`] when a connection is open.
    /// - [`ClientError::Resolve`] or [`ClientError::Connect`] when the stream
    ///   cannot be opened.
    /// - [`ClientError::Handshake`] when the greeting is missing or foreign.
    /// - [`ClientError::Server`] when the password is rejected; the
    ///   connection is closed again.
    pub fn connect(&mut self) -> Result<String, ClientError> {
        if self.session.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let stream = transport::open(&self.endpoint)?;
        let writer = stream.try_clone().map_err(|source| ClientError::Connect {
            endpoint: self.endpoint.to_string(),
            source: source.into(),
        })?;
        let mut reader = BufReader::new(stream);
        let version = read_greeting(&mut reader)?;

        self.session = Some(Session {
            reader,
            writer,
            version: version.clone(),
        });

        if let Some(password) = self.password.clone() {
            let command = Command::new("password").arg(password);
            if let Err(error) = self.execute(&command) {
                warn!(
                    target: CONNECTION_TARGET,
                    endpoint = %self.endpoint,
                    %error,
                    "authentication failed"
                );
                self.teardown();
                return Err(error);
            }
        }

        info!(
            target: CONNECTION_TARGET,
            endpoint = %self.endpoint,
            version = %version,
            "connected to daemon"
        );
        Ok(version)
    }

    /// Sends `close` when connected, then drops the stream.
    ///
    /// Calling this without a connection does nothing.
    pub fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let polite = session
            .writer
            .write_all(b"close\n")
            .and_then(|()| session.writer.flush());
        if let Err(error) = polite {
            debug!(target: CONNECTION_TARGET, %error, "close command not delivered");
        }
        if let Err(error) = session.writer.shutdown() {
            trace!(target: CONNECTION_TARGET, %error, "stream shutdown failed");
        }
        info!(target: CONNECTION_TARGET, endpoint = %self.endpoint, "disconnected from daemon");
    }

    /// True when a `ping` round-trips.
    ///
    /// Failures are reported as `false`, never propagated.
    pub fn is_connected(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }
        self.execute(&Command::new("ping"))
            .inspect_err(|error| {
                debug!(target: CONNECTION_TARGET, %error, "liveness check failed");
            })
            .is_ok()
    }

    /// Writes one command and reads its response.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidCommand`] when the command cannot be framed.
    /// - [`ClientError::NotConnected`] without a connection.
    /// - [`ClientError::ConnectionLost`] when the exchange fails; the
    ///   connection is cleared.
    /// - [`ClientError::Server`] or [`ClientError::Malformed`] from the
    ///   response.
    pub fn execute(&mut self, command: &Command) -> Result<ParsedResult, ClientError> {
        command.validate()?;
        let session = self.session.as_mut().ok_or(ClientError::NotConnected)?;

        debug!(
            target: CONNECTION_TARGET,
            command = command.name(),
            arguments = command.arguments().len(),
            "sending command"
        );
        let mut line = command.to_line();
        line.push('\n');
        let written = session
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| session.writer.flush());
        if let Err(source) = written {
            self.teardown();
            return Err(ClientError::connection_lost(source));
        }

        let result = read_response(&mut session.reader, command.shape());
        if let Err(ClientError::ConnectionLost { .. }) = &result {
            self.teardown();
        }
        result
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(error) = session.writer.shutdown() {
                trace!(target: CONNECTION_TARGET, %error, "stream shutdown failed");
            }
            warn!(target: CONNECTION_TARGET, endpoint = %self.endpoint, "connection dropped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn read_greeting(reader: &mut BufReader<Stream>) -> Result<String, ClientError> {
    let line = match read_line(reader) {
        Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(None) | Err(_) => {
            return Err(ClientError::Handshake {
                greeting: String::new(),
            });
        }
    };
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [GREETING_OK, name, version] => {
            debug!(target: CONNECTION_TARGET, daemon = *name, "greeting accepted");
            Ok((*version).to_owned())
        }
        _ => Err(ClientError::Handshake { greeting: line }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::test_support::{FakeDaemon, Reply};
    use crate::value::Value;

    fn ok_daemon() -> FakeDaemon {
        FakeDaemon::spawn(|_| Reply::ok()).expect("spawn fake daemon")
    }

    #[test]
    fn connect_reads_version_from_greeting() {
        let daemon = ok_daemon();
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());

        let version = manager.connect().expect("connect");

        assert_eq!(version, "0.23.5");
        assert_eq!(manager.version(), Some("0.23.5"));
    }

    #[test]
    fn second_connect_is_rejected() {
        let daemon = ok_daemon();
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());
        manager.connect().expect("connect");

        let error = manager.connect().expect_err("second connect");

        assert!(matches!(error, ClientError::AlreadyConnected));
        assert_eq!(daemon.connections(), 1);
    }

    #[rstest]
    #[case::other_daemon_name("OK mpd-fork 0.24.0", "0.24.0")]
    #[case::extra_spacing("OK  MPD   0.21.11", "0.21.11")]
    fn greeting_names_daemon_and_version(#[case] greeting: &str, #[case] expected: &str) {
        let daemon =
            FakeDaemon::spawn_with_greeting(greeting, |_| Reply::ok()).expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());

        assert_eq!(manager.connect().expect("connect"), expected);
    }

    #[rstest]
    #[case::not_ok("HELLO MPD 0.23.5")]
    #[case::no_version("OK MPD ")]
    #[case::trailing_token("OK MPD 0.23.5 x")]
    #[case::error("ACK [5@0] {} go away")]
    fn foreign_greeting_fails_handshake(#[case] greeting: &str) {
        let daemon =
            FakeDaemon::spawn_with_greeting(greeting, |_| Reply::ok()).expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());

        let error = manager.connect().expect_err("handshake should fail");

        assert!(
            matches!(&error, ClientError::Handshake { greeting: seen } if seen == greeting),
            "{error:?}"
        );
        assert_eq!(manager.version(), None);
    }

    #[test]
    fn unreachable_endpoint_fails_to_connect() {
        let endpoint = {
            let daemon = ok_daemon();
            daemon.endpoint().clone()
        };
        let mut manager = ConnectionManager::new(endpoint);

        let error = manager.connect().expect_err("nothing listens");

        assert!(matches!(error, ClientError::Connect { .. }), "{error:?}");
    }

    #[test]
    fn execute_without_connection_fails() {
        let mut manager = ConnectionManager::new(SocketEndpoint::tcp("127.0.0.1", 9));
        let error = manager
            .execute(&Command::new("status"))
            .expect_err("not connected");
        assert!(matches!(error, ClientError::NotConnected));
    }

    #[test]
    fn execute_returns_typed_record() {
        let daemon = FakeDaemon::spawn(|request| match request {
            "status" => Reply::ok_with(&["volume: 42", "state: pause"]),
            _ => Reply::ok(),
        })
        .expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());
        manager.connect().expect("connect");

        let record = manager
            .execute(&Command::new("status"))
            .expect("status")
            .into_record();

        assert_eq!(record.get("volume"), Some(&Value::Int(42)));
    }

    #[test]
    fn hangup_mid_command_clears_connection() {
        let daemon = FakeDaemon::spawn(|request| match request {
            "kill" => Reply::Hangup,
            _ => Reply::ok(),
        })
        .expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());
        manager.connect().expect("connect");

        let error = manager
            .execute(&Command::new("kill"))
            .expect_err("daemon hung up");
        assert!(matches!(error, ClientError::ConnectionLost { .. }), "{error:?}");
        assert_eq!(manager.version(), None);

        let follow_up = manager
            .execute(&Command::new("ping"))
            .expect_err("state cleared");
        assert!(matches!(follow_up, ClientError::NotConnected));
    }

    #[test]
    fn server_error_keeps_connection() {
        let daemon = FakeDaemon::spawn(|request| match request {
            "play 99" => Reply::ack(50, "play", "song doesn't exist"),
            _ => Reply::ok(),
        })
        .expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());
        manager.connect().expect("connect");

        let error = manager
            .execute(&Command::new("play").arg(99_i64))
            .expect_err("ack");

        assert_eq!(
            error.server_error().map(|server| server.message.as_str()),
            Some("song doesn't exist")
        );
        assert!(manager.is_connected());
    }

    #[test]
    fn is_connected_reports_false_after_hangup() {
        let pings = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&pings);
        let daemon = FakeDaemon::spawn(move |request| {
            if request == "ping" && seen.fetch_add(1, Ordering::SeqCst) > 0 {
                return Reply::Hangup;
            }
            Reply::ok()
        })
        .expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());
        manager.connect().expect("connect");

        assert!(manager.is_connected());
        assert!(!manager.is_connected());
        assert!(!manager.is_connected());
        assert_eq!(pings.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disconnect_is_idempotent_and_sends_close() {
        let daemon = ok_daemon();
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());
        manager.disconnect();
        manager.connect().expect("connect");

        manager.disconnect();
        manager.disconnect();

        assert!(daemon.wait_for(Duration::from_secs(2), |requests| {
            requests.iter().any(|request| request == "close")
        }));
        assert_eq!(manager.version(), None);
    }

    #[test]
    fn password_is_sent_after_handshake() {
        let daemon = ok_daemon();
        let mut manager = ConnectionManager::new(daemon.endpoint().clone())
            .with_password(Some(String::from("s3cret pass")));

        manager.connect().expect("connect");

        assert_eq!(daemon.requests(), ["password \"s3cret pass\""]);
    }

    #[test]
    fn rejected_password_tears_down() {
        let daemon = FakeDaemon::spawn(|request| {
            if request.starts_with("password") {
                Reply::ack(3, "password", "incorrect password")
            } else {
                Reply::ok()
            }
        })
        .expect("spawn daemon");
        let mut manager = ConnectionManager::new(daemon.endpoint().clone())
            .with_password(Some(String::from("wrong")));

        let error = manager.connect().expect_err("password rejected");

        assert_eq!(
            error.server_error().map(crate::ServerError::kind),
            Some(crate::AckKind::Password)
        );
        assert_eq!(manager.version(), None);
    }

    #[cfg(unix)]
    #[test]
    fn connects_over_unix_socket() {
        let daemon = FakeDaemon::spawn_unix(|_| Reply::ok()).expect("spawn unix daemon");
        assert!(daemon.port().is_none());
        let mut manager = ConnectionManager::new(daemon.endpoint().clone());

        manager.connect().expect("connect over unix socket");

        assert!(manager.is_connected());
    }
}
