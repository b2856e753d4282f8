//! Command channel: a single worker thread owns the connection.
//!
//! [`Client`] handles send requests over an mpsc queue and block on a
//! per-request reply channel. The queue is FIFO and the worker handles one
//! request at a time, so at most one command is ever in flight on the stream
//! and concurrent callers are served in submission order.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mpdctl_config::{Config, SocketEndpoint};
use tracing::{debug, trace};

use crate::command::Command;
use crate::connection::ConnectionManager;
use crate::status::StatusSnapshot;
use crate::value::{ParsedResult, Record};
use crate::ClientError;

const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");
const WORKER_NAME: &str = "mpdctl-channel";

enum Request {
    Connect(SyncSender<Result<String, ClientError>>),
    Disconnect(SyncSender<()>),
    IsConnected(SyncSender<bool>),
    Version(SyncSender<Option<String>>),
    Execute(Command, SyncSender<Result<ParsedResult, ClientError>>),
}

struct Worker {
    requests: Option<Sender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the queue lets the worker disconnect and exit.
        drop(self.requests.take());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            debug!(target: CHANNEL_TARGET, "channel worker panicked");
        }
    }
}

/// Cloneable handle to the command channel.
///
/// Every clone talks to the same connection. The worker disconnects politely
/// and exits once the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    endpoint: SocketEndpoint,
    worker: Arc<Worker>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Starts a disconnected client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::WorkerSpawn`] when the worker thread cannot be
    /// started.
    pub fn new(endpoint: SocketEndpoint) -> Result<Self, ClientError> {
        Self::with_password(endpoint, None)
    }

    /// Starts a disconnected client that authenticates after each handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::WorkerSpawn`] when the worker thread cannot be
    /// started.
    pub fn with_password(
        endpoint: SocketEndpoint,
        password: Option<String>,
    ) -> Result<Self, ClientError> {
        let manager = ConnectionManager::new(endpoint.clone()).with_password(password);
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(String::from(WORKER_NAME))
            .spawn(move || serve(manager, &receiver))
            .map_err(|source: io::Error| ClientError::WorkerSpawn {
                source: Arc::new(source),
            })?;

        Ok(Self {
            endpoint,
            worker: Arc::new(Worker {
                requests: Some(sender),
                thread: Some(thread),
            }),
        })
    }

    /// Starts a client for the endpoint and password in `config`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Endpoint`] when the configured host is an unusable
    /// endpoint URL; otherwise see [`Client::new`].
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::with_password(config.daemon_socket()?, config.password().map(str::to_owned))
    }

    /// Endpoint the client connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Connects and returns the protocol version.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`]; [`ClientError::WorkerStopped`]
    /// when the worker is gone.
    pub fn connect(&self) -> Result<String, ClientError> {
        self.request(Request::Connect)?
    }

    /// Disconnects; a no-op without a connection.
    pub fn disconnect(&self) {
        if self.request(Request::Disconnect).is_err() {
            trace!(target: CHANNEL_TARGET, "disconnect skipped; worker stopped");
        }
    }

    /// True when a `ping` round-trips. Never fails.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.request(Request::IsConnected).unwrap_or(false)
    }

    /// Protocol version while connected.
    #[must_use]
    pub fn version(&self) -> Option<String> {
        self.request(Request::Version).ok().flatten()
    }

    /// Runs one command and returns its parsed response.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::execute`]; [`ClientError::WorkerStopped`]
    /// when the worker is gone.
    pub fn execute(&self, command: Command) -> Result<ParsedResult, ClientError> {
        self.request(|reply| Request::Execute(command, reply))?
    }

    /// Fetches the current status.
    ///
    /// # Errors
    ///
    /// See [`Client::execute`].
    pub fn status(&self) -> Result<StatusSnapshot, ClientError> {
        self.execute(Command::new("status"))
            .map(|result| StatusSnapshot::from_record(result.into_record()))
    }

    /// Fetches the current song, `None` when the queue is empty or stopped
    /// past its end.
    ///
    /// # Errors
    ///
    /// See [`Client::execute`].
    pub fn current_song(&self) -> Result<Option<Record>, ClientError> {
        self.execute(Command::new("currentsong"))
            .map(|result| Some(result.into_record()).filter(|record| !record.is_empty()))
    }

    fn request<T>(&self, build: impl FnOnce(SyncSender<T>) -> Request) -> Result<T, ClientError> {
        let sender = self
            .worker
            .requests
            .as_ref()
            .ok_or(ClientError::WorkerStopped)?;
        let (reply, response) = mpsc::sync_channel(1);
        sender
            .send(build(reply))
            .map_err(|_| ClientError::WorkerStopped)?;
        response.recv().map_err(|_| ClientError::WorkerStopped)
    }
}

fn serve(mut manager: ConnectionManager, requests: &Receiver<Request>) {
    debug!(target: CHANNEL_TARGET, endpoint = %manager.endpoint(), "channel worker started");
    while let Ok(request) = requests.recv() {
        match request {
            Request::Connect(reply) => deliver(&reply, manager.connect()),
            Request::Disconnect(reply) => {
                manager.disconnect();
                deliver(&reply, ());
            }
            Request::IsConnected(reply) => deliver(&reply, manager.is_connected()),
            Request::Version(reply) => deliver(&reply, manager.version().map(str::to_owned)),
            Request::Execute(command, reply) => deliver(&reply, manager.execute(&command)),
        }
    }
    debug!(target: CHANNEL_TARGET, "all client handles dropped; channel worker exiting");
}

fn deliver<T>(reply: &SyncSender<T>, value: T) {
    if reply.send(value).is_err() {
        trace!(target: CHANNEL_TARGET, "caller stopped waiting for a reply");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::test_support::{tokenize, FakeDaemon, Reply};
    use crate::value::Value;

    fn connected_client(daemon: &FakeDaemon) -> Client {
        let client = Client::new(daemon.endpoint().clone()).expect("start client");
        client.connect().expect("connect");
        client
    }

    #[test]
    fn commands_fail_before_connect() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let client = Client::new(daemon.endpoint().clone()).expect("start client");

        let error = client.execute(Command::new("play")).expect_err("not connected");

        assert!(matches!(error, ClientError::NotConnected));
        assert!(!client.is_connected());
        assert_eq!(client.version(), None);
    }

    #[test]
    fn disconnect_before_connect_is_harmless() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let client = Client::new(daemon.endpoint().clone()).expect("start client");
        client.disconnect();
        client.disconnect();
        assert_eq!(daemon.connections(), 0);
    }

    #[test]
    fn status_and_current_song_are_typed() {
        let daemon = FakeDaemon::spawn(|request| match request {
            "status" => Reply::ok_with(&["volume: 65", "state: play", "song: 3"]),
            "currentsong" => Reply::ok_with(&["file: a.flac", "Title: A", "Pos: 3"]),
            _ => Reply::ok(),
        })
        .expect("spawn daemon");
        let client = connected_client(&daemon);

        let status = client.status().expect("status");
        let song = client.current_song().expect("current song").expect("a song");

        assert_eq!(status.volume(), Some(65));
        assert_eq!(song.get("pos"), Some(&Value::Int(3)));
        assert_eq!(client.version().as_deref(), Some("0.23.5"));
    }

    #[test]
    fn current_song_is_none_when_nothing_queued() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let client = connected_client(&daemon);
        assert_eq!(client.current_song().expect("current song"), None);
    }

    #[test]
    fn quoted_arguments_reach_the_daemon_intact() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let client = connected_client(&daemon);
        let arguments = ["Sgt. Pepper's \"Lonely\" Hearts", "C:\\odd path", ""];

        client
            .execute(Command::new("find").args(arguments))
            .expect("find");

        let requests = daemon.requests();
        let request = requests.last().expect("request recorded");
        let tokens = tokenize(request);
        assert_eq!(tokens.first().map(String::as_str), Some("find"));
        assert_eq!(tokens.get(1..), Some(arguments.map(String::from).as_slice()));
    }

    #[test]
    fn invalid_command_never_reaches_the_daemon() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let client = connected_client(&daemon);

        let error = client
            .execute(Command::new("add").arg("a\nclear"))
            .expect_err("line break rejected");

        assert!(matches!(error, ClientError::InvalidCommand { .. }));
        assert!(daemon.requests().is_empty());
    }

    #[test]
    fn concurrent_callers_never_interleave() {
        const CALLERS: usize = 8;
        const ROUNDS: usize = 25;

        let daemon = FakeDaemon::spawn(|request| {
            let tokens = tokenize(request);
            match tokens.as_slice() {
                [name, tag] if name == "echo" => {
                    Reply::ok_with(&[format!("tag: {tag}").as_str(), "done: 1"])
                }
                _ => Reply::ack(5, "", "unknown command"),
            }
        })
        .expect("spawn daemon");
        let client = connected_client(&daemon);

        let handles: Vec<_> = (0..CALLERS)
            .map(|caller| {
                let caller_client = client.clone();
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        let tag = format!("caller{caller} round{round}");
                        let record = caller_client
                            .execute(Command::new("echo").arg(tag.as_str()))
                            .expect("echo")
                            .into_record();
                        assert_eq!(record.get("tag"), Some(&Value::Text(tag)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("caller thread");
        }

        let expected: BTreeSet<String> = (0..CALLERS)
            .flat_map(|caller| {
                (0..ROUNDS).map(move |round| format!("echo \"caller{caller} round{round}\""))
            })
            .collect();
        let received: BTreeSet<String> = daemon.requests().into_iter().collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn dropping_the_last_handle_closes_politely() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let client = connected_client(&daemon);
        let clone = client.clone();
        drop(client);
        assert!(clone.is_connected());
        drop(clone);

        assert!(daemon.wait_for(Duration::from_secs(2), |requests| {
            requests.last().map(String::as_str) == Some("close")
        }));
    }

    #[test]
    fn from_config_accepts_an_endpoint_url() {
        let daemon = FakeDaemon::spawn(|_| Reply::ok()).expect("spawn daemon");
        let port = daemon.port().expect("tcp daemon");
        let config = Config {
            daemon_host: format!("tcp://127.0.0.1:{port}"),
            daemon_port: 1,
            ..Config::default()
        };

        let client = Client::from_config(&config).expect("start client");

        assert_eq!(client.endpoint(), daemon.endpoint());
        assert_eq!(client.connect().expect("connect"), "0.23.5");
    }

    #[test]
    fn from_config_rejects_unusable_endpoint_urls() {
        let config = Config {
            daemon_host: String::from("http://127.0.0.1:6600"),
            ..Config::default()
        };

        let error = Client::from_config(&config).expect_err("bad scheme");

        assert!(matches!(error, ClientError::Endpoint(_)), "{error:?}");
    }
}
