//! Behavioural tests for configuration precedence across defaults, files,
//! environment variables, and command-line arguments.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use mpdctl_config::{
    Config, default_daemon_port, default_log_filter, default_log_format,
    default_poll_interval_ms, default_reconnect_backoff_ms,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _env_guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_dir = TempDir::new()
            .unwrap_or_else(|error| panic!("failed to create temporary directory: {error}"));
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("mpdctl")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _env_guard: guard,
        }
    }

    fn write_config(&self, port: u16) {
        let path = self.temp_dir.path().join("mpdctl.toml");
        let toml = format!("daemon_host = \"localhost\"\ndaemon_port = {port}\n");

        if let Err(error) = fs::write(&path, toml) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in the 2024 edition. The harness
        // restores overrides in `Drop` and holds `ENV_MUTEX` meanwhile.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        let outcome = Config::load_from_iter(args).map_err(|error| error.to_string());
        *self.error.borrow_mut() = outcome.as_ref().err().cloned();
        *self.loaded.borrow_mut() = outcome.ok();
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        let Some(config) = self.loaded.borrow().clone() else {
            panic!("configuration was not loaded");
        };
        config
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            let Some(os_value) = value else {
                unsafe { std::env::remove_var(&key) };
                continue;
            };
            unsafe { std::env::set_var(&key, os_value) };
        }
    }
}

fn parse_port(port: &str) -> u16 {
    port.parse().unwrap_or_else(|error| panic!("invalid port '{port}': {error}"))
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the daemon port to \"{port}\"")]
fn given_configuration_file(harness: &Harness, port: String) {
    harness.write_config(parse_port(&port));
}

#[given("the environment overrides the daemon port to \"{port}\"")]
fn given_environment_override(harness: &Harness, port: String) {
    harness.set_env("MPDCTL_DAEMON_PORT", &port);
}

#[when("the CLI sets the daemon port to \"{port}\"")]
fn when_cli_override(harness: &Harness, port: String) {
    harness.push_cli_arg("--daemon-port");
    harness.push_cli_arg(OsString::from(&port));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the daemon port to \"{port}\"")]
fn then_resolved_port(harness: &Harness, port: String) {
    let config = harness.loaded_config();
    assert_eq!(config.daemon_port, parse_port(&port));
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();

    assert_eq!(config.daemon_port, default_daemon_port());
    assert_eq!(config.password(), None);
    assert_eq!(config.poll_interval_ms, default_poll_interval_ms());
    assert_eq!(config.reconnect_backoff_ms, default_reconnect_backoff_ms());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_environment.feature")]
fn configuration_environment(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(path = "tests/features/configuration_defaults.feature")]
fn configuration_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}
