//! Duplex byte channel abstraction.
//!
//! The protocol layers only see [`ByteChannel`]: a blocking duplex stream of
//! bytes. Plain TCP is provided here; a TLS wrapper satisfies the same trait
//! and surfaces its failures through [`ConnectionError::Ssl`].

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::io;

use tracing::debug;

use super::address::BoltServerAddress;
use super::error::ConnectionError;

/// A blocking duplex byte stream.
///
/// Methods take `&self` so that one side of a session can block in a read
/// while another thread writes an out-of-band `RESET` through the same
/// channel. Implementations must support that concurrency; `TcpStream`
/// does natively.
pub trait ByteChannel: Send + Sync {
    /// Read up to `buf.len()` bytes; returns the number read, 0 at EOF.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes; returns the number written.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Shut the stream down in both directions.
    fn shutdown(&self) -> io::Result<()>;

    /// Whether the channel is still open.
    fn is_open(&self) -> bool;
}

/// Shared handle to a channel; the input and output halves of a session
/// each hold a clone.
pub type SharedChannel = Arc<dyn ByteChannel>;

/// Plain TCP implementation of [`ByteChannel`].
pub struct TcpChannel {
    stream: TcpStream,
    open: AtomicBool,
}

impl std::fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpChannel")
            .field("stream", &self.stream)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

impl TcpChannel {
    /// Connect to `address` within `timeout`.
    pub fn connect(
        address: &BoltServerAddress,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let stream = Self::open_stream(address, timeout).map_err(|e| {
            ConnectionError::CannotConnect {
                address: address.clone(),
                source: Box::new(e),
            }
        })?;
        debug!(%address, "connected");
        Ok(Self {
            stream,
            open: AtomicBool::new(true),
        })
    }

    fn open_stream(address: &BoltServerAddress, timeout: Duration) -> io::Result<TcpStream> {
        let addrs = address.to_socket_addrs()?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
        }))
    }
}

impl ByteChannel for TcpChannel {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.stream).write(buf)
    }

    fn shutdown(&self) -> io::Result<()> {
        self.open.store(false, Ordering::SeqCst);
        match self.stream.shutdown(Shutdown::Both) {
            // Shutting down an already-dead socket is not a failure.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Read exactly `buf.len()` bytes, blocking until done.
///
/// EOF before the buffer is satisfied shuts the channel down and reports
/// [`ConnectionError::EndOfStream`].
pub fn blocking_read(channel: &SharedChannel, buf: &mut [u8]) -> Result<(), ConnectionError> {
    let mut filled = 0;
    while filled < buf.len() {
        match channel.read(&mut buf[filled..]) {
            Ok(0) => {
                let _ = channel.shutdown();
                return Err(ConnectionError::EndOfStream {
                    expected: buf.len() - filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) => return Err(ConnectionError::Read(e)),
        }
    }
    Ok(())
}

/// Write all of `buf`, blocking until done.
pub fn blocking_write(channel: &SharedChannel, buf: &[u8]) -> Result<(), ConnectionError> {
    let mut written = 0;
    while written < buf.len() {
        match channel.write(&buf[written..]) {
            Ok(0) => {
                let _ = channel.shutdown();
                return Err(ConnectionError::ConnectionClosed {
                    remaining: buf.len() - written,
                });
            }
            Ok(n) => written += n,
            Err(e) => return Err(ConnectionError::Write(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::test_support::ScriptedChannel;

    #[test]
    fn test_blocking_read_fills_buffer_across_short_reads() {
        let channel = ScriptedChannel::with_reads(vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
        let channel: SharedChannel = Arc::new(channel);

        let mut buf = [0u8; 6];
        blocking_read(&channel, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_blocking_read_eof() {
        let channel: SharedChannel = Arc::new(ScriptedChannel::with_reads(vec![vec![1, 2]]));

        let mut buf = [0u8; 4];
        let err = blocking_read(&channel, &mut buf).unwrap_err();
        match err {
            ConnectionError::EndOfStream { expected } => assert_eq!(expected, 2),
            other => panic!("expected EndOfStream, got {other:?}"),
        }
        assert!(!channel.is_open());
    }

    #[test]
    fn test_blocking_write_records_bytes() {
        let scripted = Arc::new(ScriptedChannel::new());
        let channel: SharedChannel = scripted.clone();

        blocking_write(&channel, &[0xCA, 0xFE]).unwrap();
        assert_eq!(scripted.written(), vec![0xCA, 0xFE]);
    }

    #[test]
    fn test_cannot_connect_maps_address() {
        // Port 1 on localhost is essentially never listening.
        let address = BoltServerAddress::new("127.0.0.1", 1);
        let err = TcpChannel::connect(&address, Duration::from_millis(200)).unwrap_err();
        match err {
            ConnectionError::CannotConnect { address: a, .. } => {
                assert_eq!(a, address);
            }
            other => panic!("expected CannotConnect, got {other:?}"),
        }
    }
}
