//! Configuration loading for the command-line tool.
//!
//! Leading configuration flags are split off and handed to `ortho_config`;
//! everything from the first other token onwards belongs to the command.

use std::ffi::{OsStr, OsString};

use mpdctl_config::Config;
use ortho_config::OrthoConfig;

use crate::AppError;

/// Flags understood by the configuration loader.
///
/// Mirrors the fields of [`mpdctl_config::Config`] plus the loader's own
/// `--config-path`.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--daemon-host",
    "--daemon-port",
    "--password",
    "--poll-interval-ms",
    "--reconnect-backoff-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration flags.
    ///
    /// Configuration flags after the command name are passed to the daemon
    /// as command arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or_else(|| (&*text, false), |(name, _)| (name, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by the configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the remaining tokens.
    pub(crate) cli_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut tokens = args.iter();
    let program: Vec<OsString> = tokens.next().cloned().into_iter().collect();
    let mut config_arguments = program.clone();
    let mut pending_value = false;
    let mut rest = tokens.as_slice();

    while let Some((argument, remaining)) = rest.split_first() {
        if pending_value {
            config_arguments.push(argument.clone());
            pending_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => {
                    config_arguments.push(argument.clone());
                    pending_value = needs_value;
                }
                FlagAction::Skip => break,
            }
        }
        rest = remaining;
    }

    let mut cli_arguments = program;
    cli_arguments.extend(rest.iter().cloned());
    ConfigArgumentSplit {
        config_arguments,
        cli_arguments,
    }
}
