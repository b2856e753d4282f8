//! Entry point for the `mpdctl` binary.
//!
//! Delegates to [`mpdctl::run`] with the process arguments and standard
//! streams. The streams stay unlocked: the channel worker and notifier
//! threads log to stderr while the runtime waits on them.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    mpdctl::run(std::env::args_os(), &mut stdout, &mut stderr)
}
