//! Background change notification.
//!
//! The daemon offers no push channel on the command connection, so the
//! notifier polls `status` on a fixed interval, diffs consecutive snapshots
//! and emits one event per changed field. It also restores the connection
//! after a backoff when the daemon goes away.
//!
//! The daemon's blocking `idle` command could replace polling; the notifier
//! does not use it and keeps the polling behaviour.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mpdctl_config::{Config, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECONNECT_BACKOFF_MS};
use strum::Display;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::channel::Client;
use crate::events::{Event, EventKind, EventRegistry};
use crate::status::StatusSnapshot;

mod diff;

pub use diff::{FieldChange, diff_snapshots};

const NOTIFIER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::notifier");
const LOOP_NAME: &str = "mpdctl-notifier";
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Cooperative cancellation flag shared between a task and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once [`CancellationToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, returning early once cancelled.
    ///
    /// Returns `true` when the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

/// Timing of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierSettings {
    /// Sleep between two polls.
    pub poll_interval: Duration,
    /// Extra sleep before a reconnect attempt.
    pub reconnect_backoff: Duration,
}

impl NotifierSettings {
    /// Timing taken from `config`.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
        }
    }
}

/// Lifecycle of a [`ChangeNotifier`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NotifierState {
    /// Created, not started.
    Idle,
    /// The polling loop is running.
    Running,
    /// Stopped; cannot be restarted.
    Stopped,
}

/// Errors raised by notifier lifecycle calls.
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    /// `start` was called on a running notifier.
    #[error("change notifier is already running")]
    AlreadyRunning,
    /// `start` was called after `stop`.
    #[error("change notifier has been stopped")]
    AlreadyStopped,
    /// The loop thread could not be spawned.
    #[error("failed to spawn the change notifier loop: {source}")]
    Spawn {
        /// Underlying spawn error.
        #[source]
        source: Arc<std::io::Error>,
    },
    /// The loop thread panicked, typically inside an event handler.
    #[error("change notifier loop panicked")]
    LoopPanicked,
}

/// Polls the daemon in the background and emits change events.
#[derive(Debug)]
pub struct ChangeNotifier {
    client: Client,
    registry: EventRegistry,
    settings: NotifierSettings,
    token: CancellationToken,
    state: NotifierState,
    thread: Option<JoinHandle<()>>,
}

impl ChangeNotifier {
    /// Creates an idle notifier with its own cancellation token.
    #[must_use]
    pub fn new(client: Client, registry: EventRegistry, settings: NotifierSettings) -> Self {
        Self {
            client,
            registry,
            settings,
            token: CancellationToken::new(),
            state: NotifierState::Idle,
            thread: None,
        }
    }

    /// Uses `token` for cancellation, so other owners can stop the loop.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> NotifierState {
        self.state
    }

    /// Token observed by the loop.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawns the polling loop.
    ///
    /// # Errors
    ///
    /// [`NotifierError::AlreadyRunning`] or [`NotifierError::AlreadyStopped`]
    /// outside `Idle`; [`NotifierError::Spawn`] when the thread cannot start.
    pub fn start(&mut self) -> Result<(), NotifierError> {
        match self.state {
            NotifierState::Running => return Err(NotifierError::AlreadyRunning),
            NotifierState::Stopped => return Err(NotifierError::AlreadyStopped),
            NotifierState::Idle => {}
        }

        let poll_loop = PollLoop {
            client: self.client.clone(),
            registry: self.registry.clone(),
            settings: self.settings,
            token: self.token.clone(),
            connected: None,
            previous: StatusSnapshot::empty(),
        };
        let thread = thread::Builder::new()
            .name(String::from(LOOP_NAME))
            .spawn(move || poll_loop.run())
            .map_err(|source| NotifierError::Spawn {
                source: Arc::new(source),
            })?;

        self.thread = Some(thread);
        self.state = NotifierState::Running;
        info!(
            target: NOTIFIER_TARGET,
            poll_interval_ms = self.settings.poll_interval.as_millis(),
            reconnect_backoff_ms = self.settings.reconnect_backoff.as_millis(),
            "change notifier started"
        );
        Ok(())
    }

    /// Cancels the loop and waits for it to finish its current cycle.
    ///
    /// Stopping an idle or stopped notifier only marks it stopped.
    ///
    /// # Errors
    ///
    /// [`NotifierError::LoopPanicked`] when the loop thread panicked.
    pub fn stop(&mut self) -> Result<(), NotifierError> {
        self.token.cancel();
        self.state = NotifierState::Stopped;
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let joined = thread.join().map_err(|_| NotifierError::LoopPanicked);
        info!(target: NOTIFIER_TARGET, "change notifier stopped");
        joined
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: NOTIFIER_TARGET, %error, "change notifier ended abnormally");
        }
    }
}

struct PollLoop {
    client: Client,
    registry: EventRegistry,
    settings: NotifierSettings,
    token: CancellationToken,
    connected: Option<bool>,
    previous: StatusSnapshot,
}

impl PollLoop {
    fn run(mut self) {
        while !self.token.is_cancelled() {
            self.cycle();
        }
        debug!(target: NOTIFIER_TARGET, "change notifier loop exiting");
    }

    fn cycle(&mut self) {
        let connected = self.client.is_connected();
        if self.connected != Some(connected) {
            self.connected = Some(connected);
            self.registry.emit(&Event::connection(connected));
        }

        let snapshot = if connected {
            self.client.status().unwrap_or_else(|error| {
                debug!(target: NOTIFIER_TARGET, %error, "status poll failed");
                StatusSnapshot::empty()
            })
        } else {
            StatusSnapshot::empty()
        }
        .normalized();

        for change in diff_snapshots(&self.previous, &snapshot) {
            self.dispatch(&change);
        }
        self.previous = snapshot;

        if !self.token.sleep(self.settings.poll_interval) || connected {
            return;
        }
        if self.token.sleep(self.settings.reconnect_backoff) {
            self.reconnect();
        }
    }

    fn dispatch(&self, change: &FieldChange) {
        if change.field == "song" {
            let song = self.client.current_song().unwrap_or_else(|error| {
                debug!(target: NOTIFIER_TARGET, %error, "current song fetch failed");
                None
            });
            self.registry.emit(&Event::song(song));
            return;
        }
        let Some(kind) = EventKind::from_status_field(&change.field) else {
            trace!(target: NOTIFIER_TARGET, field = %change.field, "no event for status field");
            return;
        };
        self.registry.emit(&Event::field(kind, &change.value));
    }

    fn reconnect(&self) {
        // A half-open session (ping failing without a lost stream) must be
        // dropped before a fresh connect can succeed.
        self.client.disconnect();
        match self.client.connect() {
            Ok(version) => info!(target: NOTIFIER_TARGET, %version, "reconnected to daemon"),
            Err(error) => warn!(target: NOTIFIER_TARGET, %error, "reconnect attempt failed"),
        }
    }
}

#[cfg(test)]
mod behaviour;
