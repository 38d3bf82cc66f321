//! Bolt/1 protocol implementation.
//!
//! Everything that touches the wire lives here: the PackStream codec,
//! chunked message framing, the handshake, the socket client and the
//! pipelined protocol session.
//!
//! Layering, bottom up:
//!
//! - [`channel`] - blocking duplex byte channel (TCP, or TLS behind the
//!   same trait)
//! - [`packstream`] - value model plus streaming packer/unpacker
//! - [`chunk`] - length-prefixed chunk framing with message boundaries
//! - [`message`] - the nine protocol messages, writer and reader
//! - [`handshake`] - version negotiation
//! - [`socket`] - send queue and blocking receive over one channel
//! - [`response`] - collector FIFO routing responses to requests
//! - [`connection`] - the pipelined session state machine
//! - [`guard`] - concurrent-misuse detection
//!
//! Most users should go through [`crate::driver`] instead of using these
//! types directly.

pub mod address;
pub mod channel;
pub mod chunk;
pub mod connection;
pub mod error;
pub mod guard;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod response;
pub mod socket;

#[cfg(test)]
pub(crate) mod test_support;

pub use address::BoltServerAddress;
pub use connection::{Connection, SocketConnection};
pub use error::{BoltError, BoltResult, ConnectionError, HandshakeError, ServerFailure};
pub use guard::ConcurrencyGuardingConnection;
pub use message::Message;
pub use packstream::{PackStreamError, Structure, Value, ValueMap};
pub use response::{Collector, SocketResponseHandler};
pub use socket::SocketClient;

/// Client name and version sent with `INIT`.
pub const USER_AGENT: &str = concat!("graphbolt-driver/", env!("CARGO_PKG_VERSION"));
