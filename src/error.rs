//! Error types for tokenbucket-client.
//!
//! Every error is terminal for the call that produced it. Nothing in the
//! crate retries a failed connect, read or write on its own; the caller
//! decides whether to start a fresh acquisition.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all token bucket operations.
#[derive(Debug, Error)]
pub enum TokenBucketError {
    /// Address resolution or TCP connect failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect did not complete within the configured timeout.
    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// Writing a request line failed.
    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    /// Reading a reply failed at the socket level.
    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    /// Peer closed the connection before a full line arrived.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No newline was seen within the receive buffer limit.
    #[error("reply exceeds maximum line length of {limit} bytes")]
    LineTooLong { limit: usize },

    /// `WAIT` reply whose argument is not a usable number of seconds.
    #[error("malformed WAIT argument: {0:?}")]
    MalformedWait(String),

    /// Reply with a status other than the ones the command expects.
    #[error("unrecognized status: {0}")]
    UnrecognizedStatus(String),

    /// Server answered `ERROR <message>`.
    #[error("server error: {0}")]
    ServerError(String),

    /// Bucket name would not survive the line protocol intact.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// Admin command argument rejected before sending.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configured deadline elapsed before a grant.
    #[error("deadline of {deadline:?} exceeded")]
    DeadlineExceeded { deadline: Duration },

    /// The configured maximum number of requests was sent without a grant.
    #[error("no grant after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },

    /// The cancellation token fired.
    #[error("acquisition cancelled")]
    Cancelled,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ConfigIo(#[source] std::io::Error),

    /// Configuration file is not valid JSON for `ClientConfig`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`TokenBucketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not establish the connection.
    Connect,
    /// Connection broke mid-conversation.
    Transport,
    /// Server sent something the client cannot act on.
    Protocol,
    /// A caller-imposed bound (deadline, attempts, cancellation) ended the call.
    Limit,
    /// Caller passed bad input or configuration.
    Usage,
}

impl TokenBucketError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use TokenBucketError::*;

        match self {
            Connect { .. } | ConnectTimeout { .. } => ErrorKind::Connect,
            Write(_) | Read(_) | ConnectionClosed | LineTooLong { .. } => ErrorKind::Transport,
            MalformedWait(_) | UnrecognizedStatus(_) | ServerError(_) => ErrorKind::Protocol,
            DeadlineExceeded { .. } | AttemptsExhausted { .. } | Cancelled => ErrorKind::Limit,
            InvalidBucketName(_) | InvalidArgument(_) | Config(_) | ConfigIo(_) | Json(_) => {
                ErrorKind::Usage
            }
        }
    }
}

/// Result type alias using TokenBucketError.
pub type Result<T> = std::result::Result<T, TokenBucketError>;
