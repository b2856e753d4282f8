//! Command framing.
//!
//! A [`Command`] is a name plus positional arguments. [`Command::to_line`]
//! produces the single request line written to the daemon, quoting arguments
//! that would otherwise be split by the daemon's tokenizer.

use std::fmt;

use crate::ClientError;

/// A positional command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Free text, quoted when needed.
    Text(String),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// Sent as `1` or `0`.
    Bool(bool),
    /// Half-open range `start:end`; an absent end is sent as `start:`.
    Range {
        /// First position, inclusive.
        start: u32,
        /// Last position, exclusive.
        end: Option<u32>,
    },
}

impl Argument {
    /// Builds a half-open range argument.
    #[must_use]
    pub const fn range(start: u32, end: Option<u32>) -> Self {
        Self::Range { start, end }
    }

    fn contains_line_break(&self) -> bool {
        matches!(self, Self::Text(text) if text.contains(['\n', '\r']))
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => formatter.write_str(&quote(text)),
            Self::Integer(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value}"),
            Self::Bool(value) => write!(formatter, "{}", u8::from(*value)),
            Self::Range { start, end: Some(end) } => write!(formatter, "{start}:{end}"),
            Self::Range { start, end: None } => write!(formatter, "{start}:"),
        }
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Argument {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Argument {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<std::ops::Range<u32>> for Argument {
    fn from(value: std::ops::Range<u32>) -> Self {
        Self::range(value.start, Some(value.end))
    }
}

impl From<std::ops::RangeFrom<u32>> for Argument {
    fn from(value: std::ops::RangeFrom<u32>) -> Self {
        Self::range(value.start, None)
    }
}

/// Quotes a text argument for the wire.
///
/// Text that is empty or contains whitespace, `"` or `\` is wrapped in double
/// quotes with `"` and `\` escaped; anything else is sent verbatim.
#[must_use]
pub fn quote(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|ch| ch.is_whitespace() || ch == '"' || ch == '\\');
    if !needs_quotes {
        return text.to_owned();
    }

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// How the lines of a successful response are grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// No lines become `Empty`; a repeated key starts a record list bounded
    /// by the first key; anything else is one record.
    Auto,
    /// Every line belongs to one record.
    Record,
    /// A new record starts whenever one of the boundary keys appears.
    RecordList {
        /// Keys that open a new record.
        boundaries: Vec<String>,
    },
    /// Only the values are kept.
    ScalarList,
}

impl ResponseShape {
    /// Builds a record-list shape from boundary keys.
    #[must_use]
    pub fn record_list(boundaries: &[&str]) -> Self {
        Self::RecordList {
            boundaries: boundaries.iter().map(|key| (*key).to_owned()).collect(),
        }
    }

    /// Default shape for a well-known command name.
    #[must_use]
    pub fn for_command(name: &str) -> Self {
        match name {
            "status" | "stats" | "currentsong" | "replay_gain_status" => Self::Record,
            "playlistinfo" | "playlistid" | "playlistfind" | "playlistsearch" | "plchanges"
            | "find" | "search" | "listplaylistinfo" => Self::record_list(&["file"]),
            "lsinfo" | "listallinfo" => Self::record_list(&["file", "directory", "playlist"]),
            "listplaylists" => Self::record_list(&["playlist"]),
            "outputs" => Self::record_list(&["outputid"]),
            "decoders" => Self::record_list(&["plugin"]),
            "listmounts" => Self::record_list(&["mount"]),
            "listneighbors" => Self::record_list(&["neighbor"]),
            "list" | "listall" | "listplaylist" | "tagtypes" | "commands" | "notcommands"
            | "urlhandlers" | "channels" => Self::ScalarList,
            _ => Self::Auto,
        }
    }
}

/// One request: a name followed by positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    arguments: Vec<Argument>,
    shape: ResponseShape,
}

impl Command {
    /// Starts a command with the default shape for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let command_name = name.into();
        let shape = ResponseShape::for_command(&command_name);
        Self {
            name: command_name,
            arguments: Vec::new(),
            shape,
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, argument: impl Into<Argument>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Appends several positional arguments.
    #[must_use]
    pub fn args<I, A>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Argument>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Overrides the response shape.
    #[must_use]
    pub fn with_shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Positional arguments in order.
    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Expected response shape.
    #[must_use]
    pub const fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    /// Checks that the command fits on one request line.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidCommand`] when the name is empty or not a
    /// plain token, or when an argument contains a line break.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.is_empty() {
            return Err(invalid("command name is empty"));
        }
        if !self
            .name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(invalid(format!(
                "command name {:?} is not a plain token",
                self.name
            )));
        }
        if let Some(position) = self
            .arguments
            .iter()
            .position(Argument::contains_line_break)
        {
            return Err(invalid(format!("argument {position} contains a line break")));
        }
        Ok(())
    }

    /// Request line without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = self.name.clone();
        for argument in &self.arguments {
            line.push(' ');
            line.push_str(&argument.to_string());
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_line())
    }
}

fn invalid(reason: impl Into<String>) -> ClientError {
    ClientError::InvalidCommand {
        reason: reason.into(),
    }
}
