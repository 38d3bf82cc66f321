//! Bolt v1 protocol messages.
//!
//! Each message travels as a PackStream structure whose signature byte
//! selects one of the nine message types, wrapped in chunk framing.

pub mod reader;
pub mod writer;

pub use reader::MessageReader;
pub use writer::MessageWriter;

use super::error::{BoltError, BoltResult};
use super::packstream::{PackStreamError, Value, ValueMap};

/// Message signature bytes.
pub mod signature {
    /// INIT request (0x01)
    pub const INIT: u8 = 0x01;
    /// ACK_FAILURE request (0x0E)
    pub const ACK_FAILURE: u8 = 0x0E;
    /// RESET request (0x0F)
    pub const RESET: u8 = 0x0F;
    /// RUN request (0x10)
    pub const RUN: u8 = 0x10;
    /// DISCARD_ALL request (0x2F)
    pub const DISCARD_ALL: u8 = 0x2F;
    /// PULL_ALL request (0x3F)
    pub const PULL_ALL: u8 = 0x3F;

    /// SUCCESS response (0x70)
    pub const SUCCESS: u8 = 0x70;
    /// RECORD response (0x71)
    pub const RECORD: u8 = 0x71;
    /// IGNORED response (0x7E)
    pub const IGNORED: u8 = 0x7E;
    /// FAILURE response (0x7F)
    pub const FAILURE: u8 = 0x7F;
}

/// A Bolt v1 message, request or response.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// INIT - authenticate and identify the client
    Init {
        /// Client name and version, e.g. `graphbolt-driver/0.1.0`
        client_name: String,
        /// Authentication token map, forwarded as-is
        auth_token: ValueMap,
    },
    /// RUN - submit a statement for execution
    Run {
        /// The statement text
        statement: String,
        /// Statement parameters
        parameters: ValueMap,
    },
    /// DISCARD_ALL - throw away all outstanding results
    DiscardAll,
    /// PULL_ALL - stream all outstanding results
    PullAll,
    /// ACK_FAILURE - acknowledge a FAILURE so the server resumes
    AckFailure,
    /// RESET - interrupt and return the session to a clean state
    Reset,
    /// SUCCESS - request completed
    Success {
        /// Response metadata
        meta: ValueMap,
    },
    /// RECORD - one result row
    Record {
        /// Field values for this row
        fields: Vec<Value>,
    },
    /// IGNORED - request skipped because the server is in a failed state
    Ignored,
    /// FAILURE - request failed
    Failure {
        /// Failure code, e.g. `Neo.ClientError.Statement.SyntaxError`
        code: String,
        /// Failure description
        message: String,
    },
}

impl Message {
    /// The signature byte for this message.
    pub fn signature(&self) -> u8 {
        match self {
            Message::Init { .. } => signature::INIT,
            Message::Run { .. } => signature::RUN,
            Message::DiscardAll => signature::DISCARD_ALL,
            Message::PullAll => signature::PULL_ALL,
            Message::AckFailure => signature::ACK_FAILURE,
            Message::Reset => signature::RESET,
            Message::Success { .. } => signature::SUCCESS,
            Message::Record { .. } => signature::RECORD,
            Message::Ignored => signature::IGNORED,
            Message::Failure { .. } => signature::FAILURE,
        }
    }

    /// The message name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Init { .. } => "INIT",
            Message::Run { .. } => "RUN",
            Message::DiscardAll => "DISCARD_ALL",
            Message::PullAll => "PULL_ALL",
            Message::AckFailure => "ACK_FAILURE",
            Message::Reset => "RESET",
            Message::Success { .. } => "SUCCESS",
            Message::Record { .. } => "RECORD",
            Message::Ignored => "IGNORED",
            Message::Failure { .. } => "FAILURE",
        }
    }

    /// Whether this is one of the four response messages.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Message::Success { .. }
                | Message::Record { .. }
                | Message::Ignored
                | Message::Failure { .. }
        )
    }

    /// Feed this message to a handler, one callback per message type.
    pub fn dispatch<H: MessageHandler>(self, handler: &mut H) -> BoltResult<()> {
        match self {
            Message::Init {
                client_name,
                auth_token,
            } => handler.handle_init(client_name, auth_token),
            Message::Run {
                statement,
                parameters,
            } => handler.handle_run(statement, parameters),
            Message::DiscardAll => handler.handle_discard_all(),
            Message::PullAll => handler.handle_pull_all(),
            Message::AckFailure => handler.handle_ack_failure(),
            Message::Reset => handler.handle_reset(),
            Message::Success { meta } => handler.handle_success(meta),
            Message::Record { fields } => handler.handle_record(fields),
            Message::Ignored => handler.handle_ignored(),
            Message::Failure { code, message } => handler.handle_failure(code, message),
        }
    }
}

/// Receiver interface for a stream of messages.
///
/// The client's response handler implements this; the request-side
/// callbacks exist because the wire format is symmetric, and a client
/// rejects them as malformed.
pub trait MessageHandler {
    /// INIT received.
    fn handle_init(&mut self, client_name: String, auth_token: ValueMap) -> BoltResult<()> {
        let _ = (client_name, auth_token);
        Err(unexpected(signature::INIT))
    }

    /// RUN received.
    fn handle_run(&mut self, statement: String, parameters: ValueMap) -> BoltResult<()> {
        let _ = (statement, parameters);
        Err(unexpected(signature::RUN))
    }

    /// DISCARD_ALL received.
    fn handle_discard_all(&mut self) -> BoltResult<()> {
        Err(unexpected(signature::DISCARD_ALL))
    }

    /// PULL_ALL received.
    fn handle_pull_all(&mut self) -> BoltResult<()> {
        Err(unexpected(signature::PULL_ALL))
    }

    /// ACK_FAILURE received.
    fn handle_ack_failure(&mut self) -> BoltResult<()> {
        Err(unexpected(signature::ACK_FAILURE))
    }

    /// RESET received.
    fn handle_reset(&mut self) -> BoltResult<()> {
        Err(unexpected(signature::RESET))
    }

    /// SUCCESS received.
    fn handle_success(&mut self, meta: ValueMap) -> BoltResult<()>;

    /// RECORD received.
    fn handle_record(&mut self, fields: Vec<Value>) -> BoltResult<()>;

    /// IGNORED received.
    fn handle_ignored(&mut self) -> BoltResult<()>;

    /// FAILURE received.
    fn handle_failure(&mut self, code: String, message: String) -> BoltResult<()>;
}

fn unexpected(signature: u8) -> BoltError {
    BoltError::PackStream(PackStreamError::UnexpectedMessage(signature))
}
