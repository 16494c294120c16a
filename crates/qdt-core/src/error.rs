//! Error types for qdt-core.

use thiserror::Error;

/// Main error type for qdt operations.
///
/// Every variant except [`Error::Io`] maps onto one user-facing failure
/// category of a single command execution. None of them are retried.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport session or stream could not be established.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Connection establishment did not finish in time.
    #[error("connection timed out")]
    Timeout,

    /// The server response does not follow the framing rules.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The stream ended before the declared byte count was consumed.
    #[error("truncated transfer: expected {expected} bytes, received {received}")]
    TruncatedTransfer { expected: u64, received: u64 },

    /// The destination (file or output) could not be created or written.
    #[error("local I/O error: {context}: {source}")]
    LocalIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing an established stream failed.
    #[error("stream error: {message}")]
    Stream { message: String },

    /// The command cannot be encoded onto the wire.
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The transfer was cancelled from outside the pipeline.
    #[error("transfer cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap a local I/O failure with a short description of what was attempted.
    pub fn local_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::LocalIo {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error terminates the current command.
    ///
    /// Configuration problems are reported before any command runs, so they
    /// are not counted here.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::InvalidConfig { .. })
    }

    /// Returns true if the error happened before any command was sent.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Timeout)
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Convenience result type for qdt operations.
pub type Result<T> = std::result::Result<T, Error>;
