//! PackStream serialization format.
//!
//! PackStream is the self-describing binary format the Bolt protocol uses
//! on the wire. Every value starts with a marker byte; tiny forms carry
//! their size in the marker's low nibble, sized forms follow the marker
//! with an unsigned 8/16/32-bit big-endian size.
//!
//! # Supported Types
//!
//! - **Null**: single marker byte
//! - **Boolean**: true/false markers
//! - **Integer**: narrowest of tiny/8/16/32/64-bit encodings
//! - **Float**: 64-bit IEEE 754, big-endian
//! - **Bytes**: raw bytes with a length prefix (no tiny form)
//! - **String**: UTF-8 with a length prefix
//! - **List**: counted sequence of values
//! - **Map**: counted key/value pairs, string keys, insertion-ordered
//! - **Structure**: one-byte signature plus a field list
//!
//! The codec is purely a function of bytes: the [`Packer`] and
//! [`Unpacker`] only speak to the [`PackOutput`]/[`PackInput`] traits, so
//! chunked framing can slide underneath without the codec noticing.

pub mod io;
pub mod marker;
pub mod packer;
pub mod unpacker;
pub mod value;

pub use io::{BufferedInput, BufferedOutput, PackInput, PackOutput};
pub use packer::Packer;
pub use unpacker::Unpacker;
pub use value::{Structure, Value, ValueMap};

use thiserror::Error;

/// The type of the next value in a PackStream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackType {
    /// NULL marker
    Null,
    /// TRUE or FALSE
    Boolean,
    /// Any integer width
    Integer,
    /// FLOAT_64
    Float,
    /// BYTES_8/16/32
    Bytes,
    /// Tiny string or STRING_8/16/32
    String,
    /// Tiny list or LIST_8/16/32
    List,
    /// Tiny map or MAP_8/16/32
    Map,
    /// Tiny struct or STRUCT_8/16
    Struct,
}

/// Serialization and framing failures.
///
/// Any of these on a live session means the stream is desynchronized; the
/// connection must be disposed.
#[derive(Debug, Error)]
pub enum PackStreamError {
    /// Reading from the underlying channel failed.
    #[error("Failed to read message data: {0}")]
    Input(#[source] std::io::Error),

    /// Writing to the underlying channel failed.
    #[error("Failed to write message data: {0}")]
    Output(#[source] std::io::Error),

    /// The stream ended while a value still needed bytes.
    #[error("Expected {expected} bytes available, but no more bytes accessible from underlying stream")]
    EndOfStream {
        /// Bytes still required
        expected: usize,
    },

    /// A chunk header carried a size the framing cannot accept.
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(u16),

    /// Bytes were left in the message after the last expected value.
    #[error("Trailing data left unread in the message: {unread} bytes")]
    UnexpectedData {
        /// Unconsumed payload bytes
        unread: usize,
    },

    /// A 32-bit collection size does not fit this platform's index type.
    #[error("{kind} of size {size} is too large to represent")]
    CannotRepresent {
        /// What was being decoded
        kind: &'static str,
        /// The declared size
        size: u64,
    },

    /// The next marker does not match the requested type, or is reserved.
    #[error("Expected a {expected}, but got marker 0x{marker:02X}")]
    UnexpectedType {
        /// The offending marker byte
        marker: u8,
        /// What the caller asked for
        expected: &'static str,
    },

    /// String payload was not valid UTF-8.
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[source] std::str::Utf8Error),

    /// A message structure carried the wrong number of fields.
    #[error("Invalid message received, `{name}` structures should have {expected} fields, received {actual}")]
    InvalidStructSize {
        /// Message name
        name: &'static str,
        /// Field count the signature demands
        expected: usize,
        /// Field count on the wire
        actual: usize,
    },

    /// More than 65535 structure fields were requested on pack.
    #[error("Structures cannot have more than 65535 fields, requested {0}")]
    StructureFieldOverflow(usize),

    /// A message struct carried a signature this protocol version does not
    /// define, or a response stream carried a request signature.
    #[error("Unknown message signature: 0x{0:02X}")]
    UnexpectedMessage(u8),
}
