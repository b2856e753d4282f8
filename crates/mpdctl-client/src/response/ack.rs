//! Decoding of `ACK` lines.

use crate::{ClientError, ServerError};

/// Decodes `ACK [<code>@<index>] {<command>} <message>`.
///
/// The message may be empty and so may the command (`{}`), which the daemon
/// sends for errors raised outside a command.
///
/// # Errors
///
/// Returns [`ClientError::Malformed`] when the line does not follow the
/// pattern; nothing is guessed.
pub fn decode_ack(line: &str) -> Result<ServerError, ClientError> {
    let malformed = |reason: &str| ClientError::malformed(line, reason);

    let after_prefix = line
        .strip_prefix("ACK [")
        .ok_or_else(|| malformed("missing 'ACK [' prefix"))?;
    let (code, after_code) = after_prefix
        .split_once('@')
        .ok_or_else(|| malformed("missing '@' between code and index"))?;
    let (index, after_index) = after_code
        .split_once("] {")
        .ok_or_else(|| malformed("missing '] {' after the command index"))?;
    let (command, tail) = after_index
        .split_once('}')
        .ok_or_else(|| malformed("missing '}' after the command name"))?;
    let message = match tail.strip_prefix(' ') {
        Some(text) => text,
        None if tail.is_empty() => tail,
        None => return Err(malformed("expected a space before the message")),
    };

    Ok(ServerError {
        code: code
            .parse()
            .map_err(|_| malformed("error code is not a number"))?,
        command_index: index
            .parse()
            .map_err(|_| malformed("command index is not a number"))?,
        command: command.to_owned(),
        message: message.to_owned(),
    })
}
