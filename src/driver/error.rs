//! Public error surface.
//!
//! Internal errors stay as the fine-grained sums in [`crate::bolt`]; at
//! the API boundary they collapse, exactly once, into the four exported
//! variants below.

use thiserror::Error;

use crate::bolt::error::{BoltError, ConnectionError};

/// Result type for user-facing driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported to driver users.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The server could not be reached, or the connection died.
    #[error("{message}")]
    ServiceUnavailable {
        /// What went wrong
        message: String,
    },

    /// The client did something wrong: protocol desync, misuse, or a
    /// `ClientError` reported by the server.
    #[error("{message}")]
    Client {
        /// Server failure code, when one exists
        code: Option<String>,
        /// What went wrong
        message: String,
    },

    /// A transient server condition; retrying may succeed.
    #[error("{code}: {message}")]
    Transient {
        /// Server failure code
        code: String,
        /// What went wrong
        message: String,
    },

    /// The database failed in a way that is not the client's fault.
    #[error("{code}: {message}")]
    Database {
        /// Server failure code
        code: String,
        /// What went wrong
        message: String,
    },
}

impl BoltError {
    /// Map an internal error to its public form.
    ///
    /// Connect-time failures become `ServiceUnavailable`; mid-session
    /// transport, codec, handshake and usage errors become `Client`;
    /// server failures split on their classification.
    pub fn into_public(self) -> DriverError {
        match self {
            BoltError::Connection(error) => match error {
                ConnectionError::CannotConnect { address, .. } => {
                    DriverError::ServiceUnavailable {
                        message: format!(
                            "Unable to connect to {address}, ensure the database is running and \
                             that there is a working network connection to it."
                        ),
                    }
                }
                other => DriverError::Client {
                    code: None,
                    message: other.to_string(),
                },
            },
            BoltError::Handshake(error) => DriverError::Client {
                code: None,
                message: error.to_string(),
            },
            BoltError::PackStream(error) => DriverError::Client {
                code: None,
                message: error.to_string(),
            },
            BoltError::Usage(message) => DriverError::Client {
                code: None,
                message,
            },
            BoltError::PoolFull { .. } => DriverError::Client {
                code: None,
                message: self.to_string(),
            },
            BoltError::Server(failure) => match failure.classification() {
                Some("ClientError") => DriverError::Client {
                    message: failure.message,
                    code: Some(failure.code),
                },
                Some("TransientError") => DriverError::Transient {
                    code: failure.code,
                    message: failure.message,
                },
                _ => DriverError::Database {
                    code: failure.code,
                    message: failure.message,
                },
            },
        }
    }
}
