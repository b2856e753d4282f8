//! Helpers for exercising the client against a scripted daemon.
//!
//! Compiled for the crate's own tests and, behind the `test-support` feature,
//! for downstream crates.

mod fake_daemon;

pub use fake_daemon::{FakeDaemon, Reply};

/// Splits a request line the way the daemon's tokenizer does.
///
/// Unquoted tokens end at whitespace; quoted tokens run to the closing quote
/// and honour backslash escapes.
#[must_use]
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&next) = chars.peek() {
        if next.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if next == '"' {
            chars.next();
            while let Some(ch) = chars.next() {
                match ch {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    other => token.push(other),
                }
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }
    tokens
}
