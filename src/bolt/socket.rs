//! Socket client: connect, handshake, send and receive framed messages.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::address::BoltServerAddress;
use super::channel::{SharedChannel, TcpChannel};
use super::chunk::{ChunkedInput, ChunkedOutput};
use super::error::{BoltError, BoltResult, ConnectionError};
use super::handshake;
use super::message::{Message, MessageReader, MessageWriter};
use super::response::SocketResponseHandler;

use std::sync::Arc;

/// Blocking Bolt socket client.
///
/// Owns the byte channel plus a chunk-framing reader and writer over it.
/// The two sides are locked independently so a thread can block reading a
/// response while another writes an out-of-band `RESET`.
pub struct SocketClient {
    address: BoltServerAddress,
    channel: SharedChannel,
    reader: Mutex<MessageReader<ChunkedInput>>,
    writer: Mutex<MessageWriter<ChunkedOutput>>,
}

impl SocketClient {
    /// Connect over TCP and negotiate the protocol version.
    pub fn connect(address: BoltServerAddress, timeout: Duration) -> BoltResult<Self> {
        let channel: SharedChannel = Arc::new(TcpChannel::connect(&address, timeout)?);
        Self::start(address, channel)
    }

    /// Run the handshake over an existing channel (TLS-wrapped or plain)
    /// and build the message reader and writer.
    pub fn start(address: BoltServerAddress, channel: SharedChannel) -> BoltResult<Self> {
        handshake::negotiate(&channel, &address)?;
        Ok(Self {
            address,
            reader: Mutex::new(MessageReader::new(ChunkedInput::new(channel.clone()))),
            writer: Mutex::new(MessageWriter::new(ChunkedOutput::new(channel.clone()))),
            channel,
        })
    }

    /// Drain `messages` through the writer in FIFO order, flushing once
    /// at the end if anything was written.
    pub fn send(&self, messages: &mut VecDeque<Message>) -> BoltResult<()> {
        let mut writer = self.writer.lock();
        let mut sent = 0;
        while let Some(message) = messages.pop_front() {
            debug!("C: {}", message.name());
            writer.write_message(&message)?;
            sent += 1;
        }
        if sent > 0 {
            writer.flush()?;
        }
        Ok(())
    }

    /// Receive until every waiting collector has its terminal response.
    pub fn receive_all(&self, handler: &Mutex<SocketResponseHandler>) -> BoltResult<()> {
        while handler.lock().collectors_waiting() > 0 {
            self.receive_one(handler)?;
        }
        Ok(())
    }

    /// Receive exactly one message and route it to the handler.
    ///
    /// A protocol-violation failure means the server considers this
    /// stream broken; the socket is stopped on the spot.
    pub fn receive_one(&self, handler: &Mutex<SocketResponseHandler>) -> BoltResult<()> {
        // Parse outside the handler lock: reads block, and reset_async
        // must be able to append its collector meanwhile.
        let message = self.reader.lock().read_message()?;
        debug!("S: {}", message.name());

        let violation = {
            let mut handler = handler.lock();
            message.dispatch(&mut *handler)?;
            if handler.protocol_violation_error_occurred() {
                handler.server_failure()
            } else {
                None
            }
        };

        if let Some(failure) = violation {
            self.stop()?;
            return Err(BoltError::Server(failure));
        }
        Ok(())
    }

    /// Close the underlying channel.
    pub fn stop(&self) -> BoltResult<()> {
        if self.channel.is_open() {
            self.channel
                .shutdown()
                .map_err(ConnectionError::ImproperlyClosed)?;
            debug!(address = %self.address, "disconnected");
        }
        Ok(())
    }

    /// Whether the channel is open.
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// The server address this client is connected to.
    pub fn address(&self) -> &BoltServerAddress {
        &self.address
    }
}
