//! PackStream marker bytes.
//!
//! Every PackStream value begins with a marker byte. Tiny forms encode the
//! size in the marker's low nibble; sized forms are followed by an unsigned
//! 8/16/32-bit big-endian size. Bytes not listed here are reserved and are
//! rejected by the unpacker.

/// Null marker
pub const NULL: u8 = 0xC0;

/// Float marker (64-bit IEEE 754, big-endian)
pub const FLOAT_64: u8 = 0xC1;

/// Boolean markers
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

/// Integer markers
/// Tiny integers (-16 to 127) are encoded in the marker itself
pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

/// Bytes markers (no tiny form)
pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

/// String markers
/// Tiny strings (0-15 bytes of UTF-8) use 0x80-0x8F
pub const TINY_STRING_BASE: u8 = 0x80;
pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

/// List markers
/// Tiny lists (0-15 elements) use 0x90-0x9F
pub const TINY_LIST_BASE: u8 = 0x90;
pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

/// Map markers
/// Tiny maps (0-15 entries) use 0xA0-0xAF
pub const TINY_MAP_BASE: u8 = 0xA0;
pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

/// Structure markers
/// Tiny structures (0-15 fields) use 0xB0-0xBF. There is no 32-bit form:
/// 0xDE is reserved and rejected on read.
pub const TINY_STRUCT_BASE: u8 = 0xB0;
pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// Inclusive bounds of the tiny integer range.
pub const TINY_INT_MIN: i64 = -16;
pub const TINY_INT_MAX: i64 = 127;

/// Maximum size expressible by a tiny form's low nibble.
pub const TINY_SIZE_MAX: usize = 15;

/// Check if an integer fits the single-byte tiny encoding.
#[inline]
pub fn fits_tiny_int(value: i64) -> bool {
    (TINY_INT_MIN..=TINY_INT_MAX).contains(&value)
}

/// Check if a byte is a tiny integer marker (0x00-0x7F or 0xF0-0xFF).
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}

/// Decode a tiny integer marker; the byte is the two's-complement value.
#[inline]
pub fn decode_tiny_int(marker: u8) -> i64 {
    marker as i8 as i64
}

/// The high nibble of a marker, used to classify tiny forms.
#[inline]
pub fn high_nibble(marker: u8) -> u8 {
    marker & 0xF0
}

/// The low nibble of a marker, the size of a tiny form.
#[inline]
pub fn low_nibble(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

/// Check if a byte is reserved (not allocated to any type).
#[inline]
pub fn is_reserved(marker: u8) -> bool {
    matches!(marker, 0xC4..=0xC7 | 0xCF | 0xD3 | 0xD7 | 0xDB | 0xDE | 0xDF | 0xE0..=0xEF)
}
