//! `mpdctl watch`: stream change events until interrupted.
//!
//! Handlers run on the notifier thread and forward events over a channel;
//! the calling thread owns the output stream and writes them in order.

use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use mpdctl_client::{
    CancellationToken, ChangeNotifier, Client, Event, EventKind, EventRegistry, NotifierSettings,
};
use mpdctl_config::Config;
use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::AppError;
use crate::output::{ResolvedOutputFormat, write_event};

const WATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watch");
const RECEIVE_SLICE: Duration = Duration::from_millis(50);

pub(crate) fn watch<W: Write>(
    client: Client,
    config: &Config,
    token: &CancellationToken,
    format: ResolvedOutputFormat,
    out: &mut W,
) -> Result<(), AppError> {
    client.connect()?;

    let (sender, receiver) = mpsc::channel::<Event>();
    let registry = EventRegistry::new();
    for kind in EventKind::iter() {
        let forward = sender.clone();
        registry.on(kind, move |event| {
            if forward.send(event.clone()).is_err() {
                debug!(target: WATCH_TARGET, "event dropped after output closed");
            }
        });
    }
    drop(sender);

    let mut notifier = ChangeNotifier::new(client, registry, NotifierSettings::from_config(config))
        .with_token(token.clone());
    notifier.start()?;
    info!(target: WATCH_TARGET, "watching for changes");

    while !token.is_cancelled() {
        match receiver.recv_timeout(RECEIVE_SLICE) {
            Ok(event) => write_event(&event, format, out)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    notifier.stop()?;
    Ok(())
}

/// Cancels a token when SIGINT or SIGTERM arrives.
#[cfg(unix)]
pub(crate) struct SignalListener {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalListener {
    pub(crate) fn install(token: &CancellationToken) -> Result<Self, AppError> {
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(AppError::InstallSignals)?;
        let handle = signals.handle();
        let cancel = token.clone();
        let thread = std::thread::Builder::new()
            .name(String::from("mpdctl-signals"))
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(target: WATCH_TARGET, signal, "shutdown signal received");
                    cancel.cancel();
                }
            })
            .map_err(AppError::InstallSignals)?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            debug!(target: WATCH_TARGET, "signal listener panicked");
        }
    }
}

/// Without POSIX signals the process is ended by the platform's own
/// interrupt handling.
#[cfg(not(unix))]
pub(crate) struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    #[expect(
        clippy::unnecessary_wraps,
        reason = "matches the unix signature so callers stay platform-neutral"
    )]
    pub(crate) fn install(_token: &CancellationToken) -> Result<Self, AppError> {
        Ok(Self)
    }
}
