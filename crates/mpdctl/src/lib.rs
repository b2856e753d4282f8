//! Command-line runtime for the mpdctl protocol engine.
//!
//! The runtime splits configuration flags from the command, loads layered
//! configuration, connects to the daemon and either forwards one command and
//! prints its parsed response, or (for `watch`) streams change events until
//! SIGINT or SIGTERM. Output streams and the configuration loader are
//! substitutable so tests can drive the runtime in-process.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use mpdctl_client::{CancellationToken, Client, Command};
use tracing::debug;

mod config;
mod errors;
mod output;
pub mod telemetry;
mod watch;

use config::split_config_arguments;
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;
pub use output::{OutputFormat, ResolvedOutputFormat, render_human};
use watch::SignalListener;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");
const WATCH_COMMAND: &str = "watch";

/// Sends one command to the daemon, or `watch` to stream change events.
///
/// Configuration flags (`--daemon-host`, `--daemon-port`, `--password`,
/// `--log-filter`, `--log-format`, `--config-path`, ...) must precede the
/// command.
#[derive(Parser, Debug)]
#[command(name = "mpdctl", disable_help_subcommand = true)]
struct Cli {
    /// Controls how responses and events are rendered.
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,
    /// Protocol command (for example `status`), or `watch`.
    #[arg(value_name = "COMMAND")]
    command: String,
    /// Arguments passed to the command; quoted as needed.
    #[arg(
        value_name = "ARG",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    arguments: Vec<String>,
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    loader: &'a L,
    stdout_is_terminal: bool,
    install_telemetry: bool,
    watch_token: Option<CancellationToken>,
}

impl<'a, W, E, L> CliRunner<'a, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    fn new(stdout: &'a mut W, stderr: &'a mut E, loader: &'a L) -> Self {
        Self {
            stdout,
            stderr,
            loader,
            stdout_is_terminal: io::stdout().is_terminal(),
            install_telemetry: true,
            watch_token: None,
        }
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let collected: Vec<OsString> = args.into_iter().collect();
        match self.try_run(&collected) {
            Ok(()) => ExitCode::SUCCESS,
            Err(AppError::CliUsage(error)) if !error.use_stderr() => {
                // --help and --version are successful exits printed to stdout.
                if write!(self.stdout, "{error}").is_err() {
                    return ExitCode::FAILURE;
                }
                ExitCode::SUCCESS
            }
            Err(error) => {
                if writeln!(self.stderr, "{error}").is_err() {
                    debug!(target: CLI_TARGET, %error, "failed to report error");
                }
                ExitCode::FAILURE
            }
        }
    }

    fn try_run(&mut self, args: &[OsString]) -> Result<(), AppError> {
        let split = split_config_arguments(args);
        let cli = Cli::try_parse_from(&split.cli_arguments).map_err(AppError::CliUsage)?;
        let config = self.loader.load(&split.config_arguments)?;
        if self.install_telemetry {
            telemetry::initialise(&config)?;
        }

        let format = cli.output.resolve(self.stdout_is_terminal);
        let client = Client::from_config(&config)?;

        if cli.command == WATCH_COMMAND {
            let (token, _listener) = match self.watch_token.clone() {
                Some(injected) => (injected, None),
                None => {
                    let fresh = CancellationToken::new();
                    let listener = SignalListener::install(&fresh)?;
                    (fresh, Some(listener))
                }
            };
            return watch::watch(client, &config, &token, format, &mut *self.stdout);
        }

        client.connect()?;
        let command = Command::new(cli.command).args(cli.arguments);
        let result = client.execute(command)?;
        client.disconnect();
        output::write_response(&result, format, &mut *self.stdout)
    }
}

/// Runs the CLI with `args`, writing to the given streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    CliRunner::new(stdout, stderr, &OrthoConfigLoader).run(args)
}

/// Runs the CLI with a custom configuration loader and no global logging.
#[cfg(test)]
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    watch_token: Option<CancellationToken>,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let mut runner = CliRunner::new(stdout, stderr, loader);
    runner.stdout_is_terminal = false;
    runner.install_telemetry = false;
    runner.watch_token = watch_token;
    runner.run(args)
}
