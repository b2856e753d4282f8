//! Error type for the command-line runtime.

use std::io;
use std::sync::Arc;

use mpdctl_client::{ClientError, NotifierError};
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("change notifier failed: {0}")]
    Notifier(#[from] NotifierError),
    #[cfg(unix)]
    #[error("failed to install signal handlers: {0}")]
    InstallSignals(io::Error),
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}
