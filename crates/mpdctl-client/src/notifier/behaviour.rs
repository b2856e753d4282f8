//! Behaviour tests for change notification and event registration.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use strum::IntoEnumIterator;

use super::*;
use crate::events::EventError;
use crate::test_support::{FakeDaemon, Reply};
use crate::value::Value;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct TestWorld {
    volume: Arc<AtomicI64>,
    hang_up: Arc<AtomicBool>,
    daemon: Option<FakeDaemon>,
    registry: EventRegistry,
    events: Arc<Mutex<Vec<Event>>>,
    notifier: Option<ChangeNotifier>,
    registration: Option<Result<EventKind, EventError>>,
}

impl TestWorld {
    fn start_daemon(&mut self, volume: i64) {
        self.volume.store(volume, Ordering::SeqCst);
        let reported = Arc::clone(&self.volume);
        let hang_up = Arc::clone(&self.hang_up);
        let daemon = FakeDaemon::spawn(move |request| {
            if request == "ping" && hang_up.swap(false, Ordering::SeqCst) {
                return Reply::Hangup;
            }
            match request {
                "status" => {
                    let line = format!("volume: {}", reported.load(Ordering::SeqCst));
                    Reply::ok_with(&[line.as_str(), "state: play"])
                }
                _ => Reply::ok(),
            }
        })
        .expect("spawn fake daemon");
        self.daemon = Some(daemon);
    }

    fn start_notifier(&mut self) {
        let daemon = self.daemon.as_ref().expect("daemon started");
        let client = Client::new(daemon.endpoint().clone()).expect("start client");
        client.connect().expect("connect");
        for kind in EventKind::iter() {
            let events = Arc::clone(&self.events);
            self.registry.on(kind, move |event| {
                events.lock().expect("events lock").push(event.clone());
            });
        }
        let settings = NotifierSettings {
            poll_interval: Duration::from_millis(10),
            reconnect_backoff: Duration::from_millis(30),
        };
        let mut notifier = ChangeNotifier::new(client, self.registry.clone(), settings);
        notifier.start().expect("start notifier");
        self.notifier = Some(notifier);
        assert!(self.wait_for(|events| !events.is_empty()), "no initial events");
    }

    fn events_of(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .expect("events lock")
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }

    fn wait_for(&self, predicate: impl Fn(&[Event]) -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if predicate(&self.events.lock().expect("events lock")) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn settle(&mut self) {
        let daemon = self.daemon.as_ref().expect("daemon started");
        let seen = daemon.requests().len();
        assert!(daemon.wait_for(WAIT, |requests| requests.len() > seen + 6));
        if let Some(mut notifier) = self.notifier.take() {
            notifier.stop().expect("stop notifier");
        }
    }
}

fn parse_volume(volume: &str) -> i64 {
    volume
        .parse()
        .unwrap_or_else(|error| panic!("invalid volume '{volume}': {error}"))
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}

#[given("a fake daemon reporting volume \"{volume}\"")]
fn given_fake_daemon(world: &RefCell<TestWorld>, volume: String) {
    world.borrow_mut().start_daemon(parse_volume(&volume));
}

#[given("a connected client with a running change notifier")]
fn given_running_notifier(world: &RefCell<TestWorld>) {
    world.borrow_mut().start_notifier();
}

#[given("an empty event registry")]
fn given_empty_registry(world: &RefCell<TestWorld>) {
    world.borrow_mut().registry = EventRegistry::new();
}

#[when("the daemon volume becomes \"{volume}\"")]
fn when_volume_changes(world: &RefCell<TestWorld>, volume: String) {
    let expected = parse_volume(&volume);
    let state = world.borrow();
    state.volume.store(expected, Ordering::SeqCst);
    assert!(state.wait_for(|events| {
        events.iter().any(|event| {
            event.kind() == EventKind::Volume && event.values() == [Value::Int(expected)]
        })
    }));
}

#[when("the daemon drops the connection")]
fn when_daemon_drops(world: &RefCell<TestWorld>) {
    let state = world.borrow();
    state.hang_up.store(true, Ordering::SeqCst);
    assert!(state.wait_for(|events| {
        events
            .iter()
            .filter(|event| event.kind() == EventKind::Connection)
            .count()
            >= 3
    }));
}

#[when("a handler is registered for \"{name}\"")]
fn when_handler_registered(world: &RefCell<TestWorld>, name: String) {
    let mut state = world.borrow_mut();
    let outcome = state.registry.on_named(&name, |_| {});
    state.registration = Some(outcome);
}

#[then("exactly one volume event reports \"{volume}\"")]
fn then_one_volume_event(world: &RefCell<TestWorld>, volume: String) {
    let expected = parse_volume(&volume);
    let mut state = world.borrow_mut();
    state.settle();
    let matching: Vec<Event> = state
        .events_of(EventKind::Volume)
        .into_iter()
        .filter(|event| event.values() == [Value::Int(expected)])
        .collect();
    assert_eq!(matching.len(), 1, "{matching:?}");
}

#[then("the only connection event reports \"{connected}\"")]
fn then_single_connection_event(world: &RefCell<TestWorld>, connected: String) {
    let state = world.borrow();
    let expected = connected == "true";
    assert_eq!(
        state.events_of(EventKind::Connection),
        [Event::connection(expected)]
    );
}

#[then("connection events report \"{sequence}\"")]
fn then_connection_sequence(world: &RefCell<TestWorld>, sequence: String) {
    let mut state = world.borrow_mut();
    state.settle();
    let expected: Vec<Event> = sequence
        .split(',')
        .map(|flag| Event::connection(flag.trim() == "true"))
        .collect();
    let seen = state.events_of(EventKind::Connection);
    assert_eq!(seen.get(..expected.len()), Some(expected.as_slice()));
}

#[then("registration fails for unknown event \"{name}\"")]
fn then_registration_fails(world: &RefCell<TestWorld>, name: String) {
    let state = world.borrow();
    assert_eq!(
        state.registration,
        Some(Err(EventError::UnknownEvent { name }))
    );
    assert!(EventKind::iter().all(|kind| state.registry.handler_count(kind) == 0));
}

#[scenario(path = "tests/features/notifier_volume.feature")]
fn volume_change_notification(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/notifier_reconnect.feature")]
fn reconnection_after_outage(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(path = "tests/features/event_registration.feature")]
fn event_registration(world: RefCell<TestWorld>) {
    let _ = world;
}
