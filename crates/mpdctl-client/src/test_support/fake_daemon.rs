//! Scripted single-threaded daemon.
//!
//! The daemon accepts one connection at a time, sends a greeting, records
//! every request line, and answers through a caller-supplied responder.
//! Because it serves requests strictly one after another on one thread, any
//! interleaving on the client side shows up as a garbled request.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mpdctl_config::SocketEndpoint;
use tempfile::TempDir;

use crate::transport::Stream;

const DEFAULT_GREETING: &str = "OK MPD 0.23.5";
const POLL_INTERVAL: Duration = Duration::from_millis(5);
const READ_TIMEOUT: Duration = Duration::from_millis(25);

type Responder = dyn Fn(&str) -> Reply + Send + Sync + 'static;

/// What the fake daemon does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write these lines, each followed by a newline.
    Lines(Vec<String>),
    /// Close the connection without answering.
    Hangup,
}

impl Reply {
    /// A bare `OK`.
    #[must_use]
    pub fn ok() -> Self {
        Self::ok_with(&[])
    }

    /// The given `key: value` lines followed by `OK`.
    #[must_use]
    pub fn ok_with(lines: &[&str]) -> Self {
        let mut body: Vec<String> = lines.iter().map(|line| (*line).to_owned()).collect();
        body.push(String::from("OK"));
        Self::Lines(body)
    }

    /// An `ACK` line for `command`.
    #[must_use]
    pub fn ack(code: u32, command: &str, message: &str) -> Self {
        Self::Lines(vec![format!("ACK [{code}@0] {{{command}}} {message}")])
    }

    /// Lines written verbatim, with no terminator added.
    #[must_use]
    pub fn raw(lines: &[&str]) -> Self {
        Self::Lines(lines.iter().map(|line| (*line).to_owned()).collect())
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(listener) => listener.accept().map(|(stream, _)| Stream::Tcp(stream)),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().map(|(stream, _)| Stream::Unix(stream)),
        }
    }
}

#[derive(Default)]
struct Shared {
    requests: Mutex<Vec<String>>,
    connections: AtomicUsize,
    shutdown: AtomicBool,
}

/// A fake daemon bound to an ephemeral TCP port or a temporary Unix socket.
pub struct FakeDaemon {
    endpoint: SocketEndpoint,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    _socket_dir: Option<TempDir>,
}

impl FakeDaemon {
    /// Starts a TCP daemon on `127.0.0.1` with the standard greeting.
    ///
    /// # Errors
    ///
    /// Returns the bind or spawn error.
    pub fn spawn<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        Self::spawn_with_greeting(DEFAULT_GREETING, responder)
    }

    /// Starts a TCP daemon that opens every connection with `greeting`.
    ///
    /// # Errors
    ///
    /// Returns the bind or spawn error.
    pub fn spawn_with_greeting<F>(greeting: &str, responder: F) -> io::Result<Self>
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        let endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        Self::start(
            Listener::Tcp(listener),
            endpoint,
            greeting,
            Arc::new(responder),
            None,
        )
    }

    /// Starts a daemon on a Unix socket inside a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns the directory, bind or spawn error.
    #[cfg(unix)]
    pub fn spawn_unix<F>(responder: F) -> io::Result<Self>
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let dir = TempDir::new()?;
        let path = dir.path().join("mpd.socket");
        let listener = UnixListener::bind(&path)?;
        let utf8_path = path.to_str().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "socket path is not UTF-8")
        })?;
        let endpoint = SocketEndpoint::unix(utf8_path);
        Self::start(
            Listener::Unix(listener),
            endpoint,
            DEFAULT_GREETING,
            Arc::new(responder),
            Some(dir),
        )
    }

    fn start(
        listener: Listener,
        endpoint: SocketEndpoint,
        greeting: &str,
        responder: Arc<Responder>,
        socket_dir: Option<TempDir>,
    ) -> io::Result<Self> {
        listener.set_nonblocking()?;
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let owned_greeting = greeting.to_owned();
        let handle = thread::Builder::new()
            .name(String::from("fake-mpd"))
            .spawn(move || {
                serve(&listener, &owned_greeting, responder.as_ref(), &worker_shared);
            })?;

        Ok(Self {
            endpoint,
            shared,
            handle: Some(handle),
            _socket_dir: socket_dir,
        })
    }

    /// Endpoint clients should connect to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// TCP port, when listening on TCP.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        match &self.endpoint {
            SocketEndpoint::Tcp { port, .. } => Some(*port),
            SocketEndpoint::Unix { .. } => None,
        }
    }

    /// Every request line received so far, across connections.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Waits until `predicate` holds for the recorded requests.
    ///
    /// Returns `false` when `timeout` elapses first.
    pub fn wait_for<P>(&self, timeout: Duration, predicate: P) -> bool
    where
        P: Fn(&[String]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.requests()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // A panicking responder already failed the test that installed it.
            drop(handle.join());
        }
    }
}

fn serve(listener: &Listener, greeting: &str, responder: &Responder, shared: &Shared) {
    while !shared.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(stream) => {
                shared.connections.fetch_add(1, Ordering::SeqCst);
                // Errors end this connection only; the next client is served.
                drop(serve_connection(stream, greeting, responder, shared));
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(_) => return,
        }
    }
}

fn serve_connection(
    stream: Stream,
    greeting: &str,
    responder: &Responder,
    shared: &Shared,
) -> io::Result<()> {
    stream.prepare_for_serving(READ_TIMEOUT)?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    writeln!(writer, "{greeting}")?;
    writer.flush()?;

    let mut pending = Vec::new();
    while !shared.shutdown.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut pending) {
            Ok(0) => return Ok(()),
            Ok(_) if pending.last() != Some(&b'\n') => return Ok(()),
            Ok(_) => {}
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(error) => return Err(error),
        }

        let request = String::from_utf8_lossy(&pending)
            .trim_end_matches(['\n', '\r'])
            .to_owned();
        pending.clear();
        shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if request == "close" {
            return Ok(());
        }
        match responder(&request) {
            Reply::Lines(lines) => {
                for line in lines {
                    writeln!(writer, "{line}")?;
                }
                writer.flush()?;
            }
            Reply::Hangup => {
                writer.shutdown()?;
                return Ok(());
            }
        }
    }
    Ok(())
}
