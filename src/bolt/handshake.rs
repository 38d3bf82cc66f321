//! Bolt handshake.
//!
//! Before any messages flow, the client writes a 4-byte magic preamble
//! followed by four big-endian version proposals, highest-preferred
//! first. The server answers with the single version it picked.

use tracing::debug;

use super::address::BoltServerAddress;
use super::channel::{blocking_write, SharedChannel};
use super::error::{BoltResult, ConnectionError, HandshakeError};

/// Magic preamble opening every Bolt connection.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// The protocol version this driver speaks.
pub const PROTOCOL_VERSION_1: u32 = 1;

/// "No version": the server supports none of the proposals.
pub const NO_VERSION: u32 = 0;

/// The ASCII bytes "HTTP": the peer is an HTTP endpoint, not Bolt.
pub const HTTP_SIGNATURE: u32 = 0x4854_5450;

/// Version proposals, highest-preferred first; unused slots are zero.
pub const PROPOSED_VERSIONS: [u32; 4] = [PROTOCOL_VERSION_1, 0, 0, 0];

/// Build the 20-byte client handshake: magic plus four proposals.
pub fn build_handshake() -> [u8; 20] {
    let mut data = [0u8; 20];
    data[0..4].copy_from_slice(&BOLT_MAGIC);
    for (i, version) in PROPOSED_VERSIONS.iter().enumerate() {
        let offset = 4 + i * 4;
        data[offset..offset + 4].copy_from_slice(&version.to_be_bytes());
    }
    data
}

/// Run the client side of the handshake and return the agreed version.
///
/// A stream that ends before the server sends a single response byte is
/// reported as [`ConnectionError::CannotConnect`]: nothing answered, so
/// the address is treated as unreachable.
pub fn negotiate(channel: &SharedChannel, address: &BoltServerAddress) -> BoltResult<u32> {
    debug!("C: [HANDSHAKE] 0x6060B017 [1, 0, 0, 0]");
    blocking_write(channel, &build_handshake())?;

    let mut reply = [0u8; 4];
    read_reply(channel, address, &mut reply)?;

    let proposal = u32::from_be_bytes(reply);
    match proposal {
        PROTOCOL_VERSION_1 => {
            debug!("S: [HANDSHAKE] -> 1");
            Ok(PROTOCOL_VERSION_1)
        }
        NO_VERSION => Err(HandshakeError::NoSupportedVersion.into()),
        HTTP_SIGNATURE => Err(HandshakeError::HttpEndpoint.into()),
        other => Err(HandshakeError::UnexpectedVersion(other).into()),
    }
}

fn read_reply(
    channel: &SharedChannel,
    address: &BoltServerAddress,
    reply: &mut [u8; 4],
) -> Result<(), ConnectionError> {
    let mut filled = 0;
    while filled < reply.len() {
        let outcome = match channel.read(&mut reply[filled..]) {
            Ok(0) => {
                let _ = channel.shutdown();
                Err(ConnectionError::EndOfStream {
                    expected: reply.len() - filled,
                })
            }
            Ok(n) => {
                filled += n;
                Ok(())
            }
            Err(e) => Err(ConnectionError::Read(e)),
        };
        if let Err(read_failure) = outcome {
            // No response byte at all: nothing is speaking Bolt there.
            if filled == 0 {
                return Err(ConnectionError::CannotConnect {
                    address: address.clone(),
                    source: Box::new(read_failure),
                });
            }
            return Err(read_failure);
        }
    }
    Ok(())
}
