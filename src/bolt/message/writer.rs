//! Message serialization.

use crate::bolt::packstream::io::PackOutput;
use crate::bolt::packstream::{Packer, PackStreamError, ValueMap};

use super::{signature, Message};

/// Serializes messages: one PackStream structure per message, closed with
/// a chunk boundary.
pub struct MessageWriter<O: PackOutput> {
    packer: Packer<O>,
}

impl<O: PackOutput> MessageWriter<O> {
    /// Create a writer over a chunk-framing output.
    pub fn new(output: O) -> Self {
        Self {
            packer: Packer::new(output),
        }
    }

    /// Access the underlying output.
    pub fn output_mut(&mut self) -> &mut O {
        self.packer.output_mut()
    }

    /// Serialize one message. The bytes stay buffered until
    /// [`MessageWriter::flush`].
    pub fn write(&mut self, message: &Message) -> Result<(), PackStreamError> {
        match message {
            Message::Init {
                client_name,
                auth_token,
            } => {
                self.packer.pack_struct_header(2, signature::INIT)?;
                self.packer.pack_string(client_name)?;
                self.packer.pack_map(auth_token)?;
            }
            Message::Run {
                statement,
                parameters,
            } => {
                self.packer.pack_struct_header(2, signature::RUN)?;
                self.packer.pack_string(statement)?;
                self.packer.pack_map(parameters)?;
            }
            Message::DiscardAll => {
                self.packer.pack_struct_header(0, signature::DISCARD_ALL)?;
            }
            Message::PullAll => {
                self.packer.pack_struct_header(0, signature::PULL_ALL)?;
            }
            Message::AckFailure => {
                self.packer.pack_struct_header(0, signature::ACK_FAILURE)?;
            }
            Message::Reset => {
                self.packer.pack_struct_header(0, signature::RESET)?;
            }
            Message::Success { meta } => {
                self.packer.pack_struct_header(1, signature::SUCCESS)?;
                self.packer.pack_map(meta)?;
            }
            Message::Record { fields } => {
                self.packer.pack_struct_header(1, signature::RECORD)?;
                self.packer.pack_list(fields)?;
            }
            Message::Ignored => {
                self.packer.pack_struct_header(0, signature::IGNORED)?;
            }
            Message::Failure { code, message } => {
                let mut meta = ValueMap::new();
                meta.insert("code".to_string(), code.as_str().into());
                meta.insert("message".to_string(), message.as_str().into());
                self.packer.pack_struct_header(1, signature::FAILURE)?;
                self.packer.pack_map(&meta)?;
            }
        }
        Ok(())
    }

    /// Flush buffered messages to the channel.
    pub fn flush(&mut self) -> Result<(), PackStreamError> {
        self.packer.flush()
    }
}

impl MessageWriter<crate::bolt::chunk::ChunkedOutput> {
    /// Serialize one message and close it with a message boundary.
    pub fn write_message(&mut self, message: &Message) -> Result<(), PackStreamError> {
        self.write(message)?;
        self.packer.output_mut().message_boundary()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bolt::chunk::ChunkedOutput;
    use crate::bolt::packstream::Value;
    use crate::bolt::test_support::{ScriptedChannel, VecOutput};

    fn written(message: &Message) -> Vec<u8> {
        let mut writer = MessageWriter::new(VecOutput::new());
        writer.write(message).unwrap();
        writer.packer.into_output().into_bytes()
    }

    #[test]
    fn test_write_fieldless_requests() {
        assert_eq!(written(&Message::DiscardAll), [0xB0, 0x2F]);
        assert_eq!(written(&Message::PullAll), [0xB0, 0x3F]);
        assert_eq!(written(&Message::AckFailure), [0xB0, 0x0E]);
        assert_eq!(written(&Message::Reset), [0xB0, 0x0F]);
        assert_eq!(written(&Message::Ignored), [0xB0, 0x7E]);
    }

    #[test]
    fn test_write_run() {
        let message = Message::Run {
            statement: "RETURN 1".to_string(),
            parameters: ValueMap::new(),
        };
        let bytes = written(&message);
        assert_eq!(bytes[0], 0xB2); // two-field struct
        assert_eq!(bytes[1], 0x10); // RUN
        assert_eq!(bytes[2], 0x88); // tiny string, 8 bytes
        assert_eq!(&bytes[3..11], b"RETURN 1");
        assert_eq!(bytes[11], 0xA0); // empty map
    }

    #[test]
    fn test_write_init() {
        let mut auth = ValueMap::new();
        auth.insert("scheme".to_string(), "basic".into());

        let message = Message::Init {
            client_name: "driver/1.0".to_string(),
            auth_token: auth,
        };
        let bytes = written(&message);
        assert_eq!(bytes[0], 0xB2);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x8A); // tiny string, 10 bytes
    }

    #[test]
    fn test_write_record() {
        let message = Message::Record {
            fields: vec![Value::Int(1), Value::from("x")],
        };
        let bytes = written(&message);
        assert_eq!(bytes, [0xB1, 0x71, 0x92, 0x01, 0x81, b'x']);
    }

    #[test]
    fn test_write_failure_meta_order() {
        let message = Message::Failure {
            code: "Neo.ClientError.Statement.SyntaxError".to_string(),
            message: "bad".to_string(),
        };
        let bytes = written(&message);
        assert_eq!(bytes[0], 0xB1);
        assert_eq!(bytes[1], 0x7F);
        assert_eq!(bytes[2], 0xA2); // two-entry meta map
        assert_eq!(bytes[3], 0x84); // "code" first
        assert_eq!(&bytes[4..8], b"code");
    }

    #[test]
    fn test_write_message_appends_boundary() {
        let scripted = Arc::new(ScriptedChannel::new());
        let mut writer = MessageWriter::new(ChunkedOutput::new(scripted.clone()));
        writer.write_message(&Message::Reset).unwrap();
        writer.flush().unwrap();

        assert_eq!(scripted.written(), [0x00, 0x02, 0xB0, 0x0F, 0x00, 0x00]);
    }
}
