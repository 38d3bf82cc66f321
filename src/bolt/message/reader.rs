//! Message deserialization.

use crate::bolt::chunk::ChunkedInput;
use crate::bolt::error::BoltResult;
use crate::bolt::packstream::io::PackInput;
use crate::bolt::packstream::{PackStreamError, Unpacker, Value};

use super::{signature, Message, MessageHandler};

/// Reads one message per call, validating the structure's field count
/// against its signature.
pub struct MessageReader<I: PackInput> {
    unpacker: Unpacker<I>,
}

impl<I: PackInput> MessageReader<I> {
    /// Create a reader over `input`.
    pub fn new(input: I) -> Self {
        Self {
            unpacker: Unpacker::new(input),
        }
    }

    /// Parse the next message structure, without consuming any framing.
    pub fn parse_message(&mut self) -> BoltResult<Message> {
        let size = self.unpacker.unpack_struct_header()?;
        let sig = self.unpacker.unpack_struct_signature()?;

        let message = match sig {
            signature::INIT => {
                self.expect_fields("INIT", 2, size)?;
                Message::Init {
                    client_name: self.unpacker.unpack_string()?,
                    auth_token: self.unpacker.unpack_map()?,
                }
            }
            signature::RUN => {
                self.expect_fields("RUN", 2, size)?;
                Message::Run {
                    statement: self.unpacker.unpack_string()?,
                    parameters: self.unpacker.unpack_map()?,
                }
            }
            signature::DISCARD_ALL => {
                self.expect_fields("DISCARD_ALL", 0, size)?;
                Message::DiscardAll
            }
            signature::PULL_ALL => {
                self.expect_fields("PULL_ALL", 0, size)?;
                Message::PullAll
            }
            signature::ACK_FAILURE => {
                self.expect_fields("ACK_FAILURE", 0, size)?;
                Message::AckFailure
            }
            signature::RESET => {
                self.expect_fields("RESET", 0, size)?;
                Message::Reset
            }
            signature::SUCCESS => {
                self.expect_fields("SUCCESS", 1, size)?;
                Message::Success {
                    meta: self.unpacker.unpack_map()?,
                }
            }
            signature::RECORD => {
                self.expect_fields("RECORD", 1, size)?;
                Message::Record {
                    fields: self.unpacker.unpack_list()?,
                }
            }
            signature::IGNORED => {
                self.expect_fields("IGNORED", 0, size)?;
                Message::Ignored
            }
            signature::FAILURE => {
                self.expect_fields("FAILURE", 1, size)?;
                let meta = self.unpacker.unpack_map()?;
                // A server that omits code or message is already beyond
                // spec; decode what is there rather than failing twice.
                let code = meta
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let message = meta
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Message::Failure { code, message }
            }
            other => return Err(PackStreamError::UnexpectedMessage(other).into()),
        };
        Ok(message)
    }

    fn expect_fields(
        &self,
        name: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), PackStreamError> {
        if expected != actual {
            return Err(PackStreamError::InvalidStructSize {
                name,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl MessageReader<ChunkedInput> {
    /// Read one chunk-framed message, consuming its boundary marker.
    pub fn read_message(&mut self) -> BoltResult<Message> {
        let message = self.parse_message()?;
        self.unpacker.input_mut().message_boundary()?;
        Ok(message)
    }

    /// Read one message and dispatch it to `handler`.
    pub fn read<H: MessageHandler>(&mut self, handler: &mut H) -> BoltResult<()> {
        self.read_message()?.dispatch(handler)
    }
}
