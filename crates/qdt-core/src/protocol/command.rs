//! Outgoing command line.

use std::fmt;
use std::str::FromStr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::{VERB_GET, VERB_LIST};
use crate::error::{Error, Result};

/// Request kind understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `ls`: list available entries.
    List,
    /// `get`: download one file.
    Get,
}

impl Verb {
    /// Wire spelling of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::List => VERB_LIST,
            Verb::Get => VERB_GET,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            VERB_LIST => Ok(Verb::List),
            VERB_GET => Ok(Verb::Get),
            other => Err(Error::InvalidCommand {
                message: format!("unknown verb: {other}"),
            }),
        }
    }
}

/// A verb plus optional argument, serialized as a single line.
///
/// Construction validates the argument, so an existing `Command` always
/// encodes to exactly one newline-terminated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    argument: Option<String>,
}

impl Command {
    /// Build a command, validating the argument for the given verb.
    pub fn new(verb: Verb, argument: Option<String>) -> Result<Self> {
        if let Some(arg) = &argument {
            if arg.contains(['\n', '\r']) {
                return Err(Error::InvalidCommand {
                    message: "argument must not contain line breaks".into(),
                });
            }
        }

        let argument = argument.filter(|arg| !arg.is_empty());
        if verb == Verb::Get && argument.is_none() {
            return Err(Error::InvalidCommand {
                message: "get requires a filename".into(),
            });
        }

        Ok(Self { verb, argument })
    }

    /// The `ls` command.
    pub fn list() -> Self {
        Self {
            verb: Verb::List,
            argument: None,
        }
    }

    /// A `get <name>` command.
    pub fn get(name: impl Into<String>) -> Result<Self> {
        Self::new(Verb::Get, Some(name.into()))
    }

    /// Parse a command line as the server would read it (trailing newline optional).
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let (verb, argument) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest.to_string())),
            None => (line, None),
        };
        Self::new(verb.parse()?, argument)
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Encode to the newline-terminated wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut line = self.to_string().into_bytes();
        line.push(b'\n');
        line
    }

    /// Write the encoded line to a stream and flush it.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let line = self.encode();
        writer.write_all(&line).await.map_err(|e| Error::Stream {
            message: format!("failed to send command: {e}"),
        })?;
        writer.flush().await.map_err(|e| Error::Stream {
            message: format!("failed to flush command: {e}"),
        })?;
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "{} {}", self.verb, arg),
            None => write!(f, "{}", self.verb),
        }
    }
}
