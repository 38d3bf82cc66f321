//! Buffered big-endian IO for the PackStream codec.
//!
//! [`PackInput`] and [`PackOutput`] are the only surface the packer and
//! unpacker see; the chunked framing layer implements them too, so the
//! codec stays oblivious to chunk boundaries.

use bytes::{Buf, BufMut, BytesMut};

use crate::bolt::channel::SharedChannel;

use super::PackStreamError;

const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Sink of big-endian primitives for the packer.
pub trait PackOutput {
    /// Write one byte.
    fn write_u8(&mut self, value: u8) -> Result<(), PackStreamError>;

    /// Write a big-endian 16-bit value.
    fn write_u16(&mut self, value: u16) -> Result<(), PackStreamError>;

    /// Write a big-endian 32-bit value.
    fn write_u32(&mut self, value: u32) -> Result<(), PackStreamError>;

    /// Write a big-endian 64-bit value.
    fn write_u64(&mut self, value: u64) -> Result<(), PackStreamError>;

    /// Write an IEEE-754 double, big-endian.
    fn write_f64(&mut self, value: f64) -> Result<(), PackStreamError> {
        self.write_u64(value.to_bits())
    }

    /// Write a run of raw bytes.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackStreamError>;

    /// Push all buffered bytes to the underlying channel.
    fn flush(&mut self) -> Result<(), PackStreamError>;
}

/// Source of big-endian primitives for the unpacker.
pub trait PackInput {
    /// Read one byte.
    fn read_u8(&mut self) -> Result<u8, PackStreamError>;

    /// Read a big-endian 16-bit value.
    fn read_u16(&mut self) -> Result<u16, PackStreamError>;

    /// Read a big-endian 32-bit value.
    fn read_u32(&mut self) -> Result<u32, PackStreamError>;

    /// Read a big-endian 64-bit value.
    fn read_u64(&mut self) -> Result<u64, PackStreamError>;

    /// Read an IEEE-754 double, big-endian.
    fn read_f64(&mut self) -> Result<f64, PackStreamError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Fill `dest` completely with raw bytes.
    fn read_bytes(&mut self, dest: &mut [u8]) -> Result<(), PackStreamError>;

    /// Look at the next byte without consuming it.
    fn peek_u8(&mut self) -> Result<u8, PackStreamError>;
}

/// Fixed-capacity buffered reader over a byte channel.
pub struct BufferedInput {
    channel: SharedChannel,
    buffer: BytesMut,
    scratch: Vec<u8>,
}

impl BufferedInput {
    /// Create a reader with the default buffer capacity.
    pub fn new(channel: SharedChannel) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY, channel)
    }

    /// Create a reader with a specific buffer capacity.
    pub fn with_capacity(capacity: usize, channel: SharedChannel) -> Self {
        Self {
            channel,
            buffer: BytesMut::with_capacity(capacity),
            scratch: vec![0; capacity.max(16)],
        }
    }

    /// Number of bytes currently buffered but unread.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn fill(&mut self, need: usize) -> Result<(), PackStreamError> {
        while self.buffer.len() < need {
            match self.channel.read(&mut self.scratch) {
                Ok(0) => {
                    return Err(PackStreamError::EndOfStream {
                        expected: need - self.buffer.len(),
                    })
                }
                Ok(n) => self.buffer.extend_from_slice(&self.scratch[..n]),
                Err(e) => return Err(PackStreamError::Input(e)),
            }
        }
        Ok(())
    }
}

impl PackInput for BufferedInput {
    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        self.fill(1)?;
        Ok(self.buffer.get_u8())
    }

    fn read_u16(&mut self) -> Result<u16, PackStreamError> {
        self.fill(2)?;
        Ok(self.buffer.get_u16())
    }

    fn read_u32(&mut self) -> Result<u32, PackStreamError> {
        self.fill(4)?;
        Ok(self.buffer.get_u32())
    }

    fn read_u64(&mut self) -> Result<u64, PackStreamError> {
        self.fill(8)?;
        Ok(self.buffer.get_u64())
    }

    fn read_bytes(&mut self, dest: &mut [u8]) -> Result<(), PackStreamError> {
        let mut filled = 0;
        while filled < dest.len() {
            if self.buffer.is_empty() {
                self.fill(1).map_err(|e| match e {
                    PackStreamError::EndOfStream { .. } => PackStreamError::EndOfStream {
                        expected: dest.len() - filled,
                    },
                    other => other,
                })?;
            }
            let take = self.buffer.len().min(dest.len() - filled);
            self.buffer.copy_to_slice(&mut dest[filled..filled + take]);
            filled += take;
        }
        Ok(())
    }

    fn peek_u8(&mut self) -> Result<u8, PackStreamError> {
        self.fill(1)?;
        Ok(self.buffer[0])
    }
}

/// Fixed-capacity buffered writer over a byte channel; flushes when full.
pub struct BufferedOutput {
    channel: SharedChannel,
    buffer: BytesMut,
    capacity: usize,
}

impl BufferedOutput {
    /// Create a writer with the default buffer capacity.
    pub fn new(channel: SharedChannel) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY, channel)
    }

    /// Create a writer with a specific buffer capacity.
    pub fn with_capacity(capacity: usize, channel: SharedChannel) -> Self {
        let capacity = capacity.max(16);
        Self {
            channel,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    fn ensure(&mut self, size: usize) -> Result<(), PackStreamError> {
        if self.buffer.len() + size > self.capacity {
            self.flush()?;
        }
        Ok(())
    }
}

impl PackOutput for BufferedOutput {
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
            if self.buffer.len() == self.capacity {
                self.flush()?;
            }
            let take = (self.capacity - self.buffer.len()).min(data.len() - offset);
            self.buffer.extend_from_slice(&data[offset..offset + take]);
            offset += take;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PackStreamError> {
        while !self.buffer.is_empty() {
            match self.channel.write(&self.buffer) {
                Ok(0) => {
                    return Err(PackStreamError::Output(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "channel accepted no bytes",
                    )))
                }
                Ok(n) => {
                    self.buffer.advance(n);
                }
                Err(e) => return Err(PackStreamError::Output(e)),
            }
        }
        self.buffer.clear();
        Ok(())
    }
}
