//! Bolt protocol error types.
//!
//! Errors fall into four categories: transport failures (the connection is
//! dead and must be disposed), codec failures (the stream is desynchronized
//! and must be disposed), server failures (recoverable or not depending on
//! their code), and usage errors raised on caller misuse.

use std::io;

use thiserror::Error;

use super::address::BoltServerAddress;
use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Transport-level failures on the byte channel.
///
/// Every variant implies the underlying connection is no longer usable.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connect (or the handshake's first read) failed.
    #[error("Unable to connect to {address}: {source}")]
    CannotConnect {
        /// The address the client attempted to reach
        address: BoltServerAddress,
        /// The underlying failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Reading from the channel failed.
    #[error("Failed to read from the network connection: {0}")]
    Read(#[source] io::Error),

    /// The peer closed the stream while more bytes were expected.
    #[error(
        "Connection terminated while receiving data. This can happen due to network \
         instabilities, or due to restarts of the database. Expected {expected} more bytes."
    )]
    EndOfStream {
        /// Bytes still required when the stream ended
        expected: usize,
    },

    /// Writing to the channel failed.
    #[error("Failed to write to the network connection: {0}")]
    Write(#[source] io::Error),

    /// The peer closed the stream while data remained unsent.
    #[error(
        "Connection terminated while sending data. This can happen due to network \
         instabilities, or due to restarts of the database. {remaining} bytes were left unsent."
    )]
    ConnectionClosed {
        /// Bytes still queued when the stream closed
        remaining: usize,
    },

    /// Opaque failure reported by a TLS channel implementation.
    #[error("TLS failure on the underlying channel: {0}")]
    Ssl(String),

    /// Closing the channel did not complete cleanly.
    #[error("Unable to close the network connection cleanly: {0}")]
    ImproperlyClosed(#[source] io::Error),
}

/// Version negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The server answered with version 0.
    #[error(
        "The server does not support any of the protocol versions supported by this driver. \
         Ensure that you are using driver and server versions that are compatible with one another."
    )]
    NoSupportedVersion,

    /// The server answered with the ASCII bytes "HTTP".
    #[error(
        "Server responded HTTP. Make sure you are not trying to connect to the http endpoint \
         (HTTP defaults to port 7474 whereas BOLT defaults to port 7687)"
    )]
    HttpEndpoint,

    /// The server proposed a version this driver never offered.
    #[error("Protocol error, server suggested unexpected protocol version: {0}")]
    UnexpectedVersion(u32),
}

/// A FAILURE message received from the server.
///
/// Codes are dot-separated `Neo.<classification>.<category>.<title>`
/// strings. The classification drives recovery: a `ClientError` or
/// `TransientError` can be cleared with `ACK_FAILURE`, anything else
/// poisons the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ServerFailure {
    /// Failure code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Human-readable message from the server
    pub message: String,
}

impl ServerFailure {
    /// Create a failure from its code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The classification segment of the code (`ClientError`,
    /// `TransientError`, `DatabaseError`, ...), if present.
    pub fn classification(&self) -> Option<&str> {
        self.code.split('.').nth(1)
    }

    /// `Neo.ClientError.Request.*` codes mean the server considers the
    /// client's protocol stream malformed.
    pub fn is_protocol_violation(&self) -> bool {
        self.code.starts_with("Neo.ClientError.Request")
    }

    /// An unrecoverable failure marks the connection for disposal; the
    /// session cannot be repaired with `ACK_FAILURE`.
    pub fn is_unrecoverable(&self) -> bool {
        self.is_protocol_violation()
            || !(self.code.contains("ClientError") || self.code.contains("TransientError"))
    }
}

/// The internal error sum across all Bolt subsystems.
#[derive(Debug, Error)]
pub enum BoltError {
    /// Transport failure
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Version negotiation failure
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Serialization or framing failure
    #[error(transparent)]
    PackStream(#[from] PackStreamError),

    /// FAILURE response from the server
    #[error(transparent)]
    Server(#[from] ServerFailure),

    /// Caller misuse (concurrent session use, released connection, ...)
    #[error("{0}")]
    Usage(String),

    /// Pool capacity exhausted within the acquire timeout.
    #[error(
        "Unable to acquire a connection to {address} from the pool: all {max_sessions} \
         sessions are in use and none was released within the acquire timeout"
    )]
    PoolFull {
        /// The address whose queue is exhausted
        address: BoltServerAddress,
        /// Configured capacity
        max_sessions: usize,
    },
}

impl BoltError {
    /// True when the failure means the underlying connection must be
    /// disposed rather than returned to a pool.
    pub fn is_fatal_for_connection(&self) -> bool {
        match self {
            BoltError::Connection(_) | BoltError::Handshake(_) | BoltError::PackStream(_) => true,
            BoltError::Server(failure) => failure.is_unrecoverable(),
            BoltError::Usage(_) | BoltError::PoolFull { .. } => false,
        }
    }
}
