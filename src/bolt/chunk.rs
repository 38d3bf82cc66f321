//! Chunked message framing.
//!
//! Messages travel as a run of chunks, each prefixed with a 16-bit
//! big-endian byte count, terminated by a zero-length chunk (`0x00 0x00`)
//! marking the message boundary. The writer reserves two bytes when a
//! chunk opens and back-patches the size when it closes; readers
//! reassemble payload across chunks until the boundary.

use bytes::{BufMut, BytesMut};

use super::channel::SharedChannel;
use super::packstream::io::{BufferedInput, PackInput, PackOutput};
use super::packstream::PackStreamError;

/// Largest payload one chunk can carry.
pub const MAX_CHUNK_SIZE: usize = 0xFFFF;

/// Bytes reserved for a chunk's size prefix.
pub const CHUNK_HEADER_SIZE: usize = 2;

/// The end-of-message marker.
pub const MESSAGE_BOUNDARY: [u8; 2] = [0x00, 0x00];

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// [`PackOutput`] that frames everything written into length-prefixed
/// chunks.
pub struct ChunkedOutput {
    channel: SharedChannel,
    buffer: BytesMut,
    capacity: usize,
    chunk_header_offset: usize,
    chunk_open: bool,
}

impl ChunkedOutput {
    /// Create a chunked writer with the default buffer size.
    pub fn new(channel: SharedChannel) -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE, channel)
    }

    /// Create a chunked writer with a specific buffer size. The buffer
    /// bounds the chunk payload, so it is clamped to `MAX_CHUNK_SIZE`
    /// plus the header.
    pub fn with_buffer_size(buffer_size: usize, channel: SharedChannel) -> Self {
        let capacity = buffer_size
            .max(16)
            .min(MAX_CHUNK_SIZE + CHUNK_HEADER_SIZE);
        Self {
            channel,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            chunk_header_offset: 0,
            chunk_open: false,
        }
    }

    /// Close the open chunk and emit the `0x00 0x00` end-of-message
    /// marker. An empty message still produces a boundary.
    pub fn message_boundary(&mut self) -> Result<(), PackStreamError> {
        self.close_chunk_if_open();
        if self.capacity - self.buffer.len() < CHUNK_HEADER_SIZE {
            self.write_out()?;
        }
        self.buffer.put_slice(&MESSAGE_BOUNDARY);
        Ok(())
    }

    fn close_chunk_if_open(&mut self) {
        if self.chunk_open {
            let chunk_size =
                self.buffer.len() - (self.chunk_header_offset + CHUNK_HEADER_SIZE);
            let header = (chunk_size as u16).to_be_bytes();
            self.buffer[self.chunk_header_offset] = header[0];
            self.buffer[self.chunk_header_offset + 1] = header[1];
            self.chunk_open = false;
        }
    }

    /// Ensure an open chunk with at least one byte of room, flushing and
    /// rolling to a new chunk as needed.
    fn ensure(&mut self, size: usize) -> Result<(), PackStreamError> {
        let needed = if self.chunk_open {
            size
        } else {
            size + CHUNK_HEADER_SIZE
        };
        if self.capacity - self.buffer.len() < needed {
            self.write_out()?;
        }
        if !self.chunk_open {
            self.chunk_header_offset = self.buffer.len();
            self.buffer.put_slice(&[0, 0]);
            self.chunk_open = true;
        }
        Ok(())
    }

    fn write_out(&mut self) -> Result<(), PackStreamError> {
        self.close_chunk_if_open();
        let mut remaining: &[u8] = &self.buffer;
        while !remaining.is_empty() {
            match self.channel.write(remaining) {
                Ok(0) => {
                    return Err(PackStreamError::Output(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "channel accepted no bytes",
                    )))
                }
                Ok(n) => remaining = &remaining[n..],
                Err(e) => return Err(PackStreamError::Output(e)),
            }
        }
        self.buffer.clear();
        Ok(())
    }
}

impl PackOutput for ChunkedOutput {
    fn write_u8(&mut self, value: u8) -> Result<(), PackStreamError> {
        self.ensure(1)?;
        self.buffer.put_u8(value);
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), PackStreamError> {
        self.ensure(2)?;
        self.buffer.put_u16(value);
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), PackStreamError> {
        self.ensure(4)?;
        self.buffer.put_u32(value);
        Ok(())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), PackStreamError> {
        self.ensure(8)?;
        self.buffer.put_u64(value);
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackStreamError> {
        let mut offset = 0;
        while offset < data.len() {
            // Keep at least one byte of chunk space, then take what fits.
            self.ensure(1)?;
            let room = self.capacity - self.buffer.len();
            let take = room.min(data.len() - offset);
            self.buffer.extend_from_slice(&data[offset..offset + take]);
            offset += take;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PackStreamError> {
        self.write_out()
    }
}

/// [`PackInput`] that strips chunk framing, reassembling message payload
/// across chunk boundaries.
pub struct ChunkedInput {
    input: BufferedInput,
    remaining_chunk: usize,
}

impl ChunkedInput {
    /// Create a chunked reader over `channel`.
    pub fn new(channel: SharedChannel) -> Self {
        Self {
            input: BufferedInput::new(channel),
            remaining_chunk: 0,
        }
    }

    /// Consume the end-of-message marker. Fails with
    /// [`PackStreamError::UnexpectedData`] if payload bytes are still
    /// pending: the codec should have consumed the whole message.
    pub fn message_boundary(&mut self) -> Result<(), PackStreamError> {
        if self.remaining_chunk != 0 {
            return Err(PackStreamError::UnexpectedData {
                unread: self.remaining_chunk,
            });
        }
        let terminator = self.input.read_u16()?;
        if terminator != 0 {
            return Err(PackStreamError::UnexpectedData {
                unread: terminator as usize,
            });
        }
        Ok(())
    }

    /// Open the next chunk. A zero-length header here means the message
    /// ended while a value still needed bytes.
    fn next_chunk(&mut self) -> Result<(), PackStreamError> {
        let size = self.input.read_u16()?;
        if size == 0 {
            return Err(PackStreamError::InvalidChunkSize(0));
        }
        self.remaining_chunk = size as usize;
        Ok(())
    }

    fn read_exact(&mut self, dest: &mut [u8]) -> Result<(), PackStreamError> {
        let mut filled = 0;
        while filled < dest.len() {
            if self.remaining_chunk == 0 {
                self.next_chunk()?;
            }
            let take = self.remaining_chunk.min(dest.len() - filled);
            self.input.read_bytes(&mut dest[filled..filled + take])?;
            self.remaining_chunk -= take;
            filled += take;
        }
        Ok(())
    }
}

impl PackInput for ChunkedInput {
    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn read_u32(&mut self) -> Result<u32, PackStreamError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_u64(&mut self) -> Result<u64, PackStreamError> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    fn read_bytes(&mut self, dest: &mut [u8]) -> Result<(), PackStreamError> {
        self.read_exact(dest)
    }

    fn peek_u8(&mut self) -> Result<u8, PackStreamError> {
        if self.remaining_chunk == 0 {
            self.next_chunk()?;
        }
        self.input.peek_u8()
    }
}
