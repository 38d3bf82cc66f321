//! PackStream unpacker.

use super::io::PackInput;
use super::marker::*;
use super::value::{Structure, Value, ValueMap};
use super::{PackStreamError, PackType};

/// Streaming PackStream deserializer over a [`PackInput`].
pub struct Unpacker<I: PackInput> {
    input: I,
}

impl<I: PackInput> Unpacker<I> {
    /// Create an unpacker reading from `input`.
    pub fn new(input: I) -> Self {
        Self { input }
    }

    /// Access the underlying input.
    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    /// Consume the unpacker, returning the input.
    pub fn into_input(self) -> I {
        self.input
    }

    /// Classify the next value without consuming its marker.
    pub fn peek_next_type(&mut self) -> Result<PackType, PackStreamError> {
        let marker = self.input.peek_u8()?;
        Self::classify(marker)
    }

    fn classify(marker: u8) -> Result<PackType, PackStreamError> {
        if is_tiny_int(marker) {
            return Ok(PackType::Integer);
        }
        match high_nibble(marker) {
            TINY_STRING_BASE => return Ok(PackType::String),
            TINY_LIST_BASE => return Ok(PackType::List),
            TINY_MAP_BASE => return Ok(PackType::Map),
            TINY_STRUCT_BASE => return Ok(PackType::Struct),
            _ => {}
        }
        match marker {
            NULL => Ok(PackType::Null),
            TRUE | FALSE => Ok(PackType::Boolean),
            FLOAT_64 => Ok(PackType::Float),
            INT_8 | INT_16 | INT_32 | INT_64 => Ok(PackType::Integer),
            BYTES_8 | BYTES_16 | BYTES_32 => Ok(PackType::Bytes),
            STRING_8 | STRING_16 | STRING_32 => Ok(PackType::String),
            LIST_8 | LIST_16 | LIST_32 => Ok(PackType::List),
            MAP_8 | MAP_16 | MAP_32 => Ok(PackType::Map),
            STRUCT_8 | STRUCT_16 => Ok(PackType::Struct),
            other => Err(PackStreamError::UnexpectedType {
                marker: other,
                expected: "an allocated marker",
            }),
        }
    }

    /// Advance over a NULL marker.
    pub fn unpack_null(&mut self) -> Result<(), PackStreamError> {
        let marker = self.input.read_u8()?;
        if marker != NULL {
            return Err(PackStreamError::UnexpectedType {
                marker,
                expected: "null",
            });
        }
        Ok(())
    }

    /// Unpack a boolean.
    pub fn unpack_bool(&mut self) -> Result<bool, PackStreamError> {
        let marker = self.input.read_u8()?;
        match marker {
            TRUE => Ok(true),
            FALSE => Ok(false),
            other => Err(PackStreamError::UnexpectedType {
                marker: other,
                expected: "boolean",
            }),
        }
    }

    /// Unpack an integer of any width.
    pub fn unpack_int(&mut self) -> Result<i64, PackStreamError> {
        let marker = self.input.read_u8()?;
        if is_tiny_int(marker) {
            return Ok(decode_tiny_int(marker));
        }
        match marker {
            INT_8 => Ok(self.input.read_u8()? as i8 as i64),
            INT_16 => Ok(self.input.read_u16()? as i16 as i64),
            INT_32 => Ok(self.input.read_u32()? as i32 as i64),
            INT_64 => Ok(self.input.read_u64()? as i64),
            other => Err(PackStreamError::UnexpectedType {
                marker: other,
                expected: "integer",
            }),
        }
    }

    /// Unpack a 64-bit float.
    pub fn unpack_float(&mut self) -> Result<f64, PackStreamError> {
        let marker = self.input.read_u8()?;
        if marker != FLOAT_64 {
            return Err(PackStreamError::UnexpectedType {
                marker,
                expected: "float",
            });
        }
        self.input.read_f64()
    }

    /// Unpack a UTF-8 string.
    pub fn unpack_string(&mut self) -> Result<String, PackStreamError> {
        let marker = self.input.read_u8()?;
        let size = if high_nibble(marker) == TINY_STRING_BASE {
            low_nibble(marker)
        } else {
            match marker {
                STRING_8 => self.input.read_u8()? as usize,
                STRING_16 => self.input.read_u16()? as usize,
                STRING_32 => {
                    let size = self.read_size_32()?;
                    Self::represent(size, "string (STRING_32)")?
                }
                other => {
                    return Err(PackStreamError::UnexpectedType {
                        marker: other,
                        expected: "string",
                    })
                }
            }
        };
        let raw = self.read_raw(size)?;
        String::from_utf8(raw).map_err(|e| PackStreamError::InvalidUtf8(e.utf8_error()))
    }

    /// Unpack a byte array.
    pub fn unpack_bytes(&mut self) -> Result<Vec<u8>, PackStreamError> {
        let marker = self.input.read_u8()?;
        let size = match marker {
            BYTES_8 => self.input.read_u8()? as usize,
            BYTES_16 => self.input.read_u16()? as usize,
            BYTES_32 => {
                let size = self.read_size_32()?;
                Self::represent(size, "binary data (BYTES_32)")?
            }
            other => {
                return Err(PackStreamError::UnexpectedType {
                    marker: other,
                    expected: "binary data",
                })
            }
        };
        self.read_raw(size)
    }

    /// Unpack a list header, returning the element count.
    pub fn unpack_list_header(&mut self) -> Result<usize, PackStreamError> {
        let marker = self.input.read_u8()?;
        if high_nibble(marker) == TINY_LIST_BASE {
            return Ok(low_nibble(marker));
        }
        match marker {
            LIST_8 => Ok(self.input.read_u8()? as usize),
            LIST_16 => Ok(self.input.read_u16()? as usize),
            LIST_32 => {
                let size = self.read_size_32()?;
                Self::represent(size, "list (LIST_32)")
            }
            other => Err(PackStreamError::UnexpectedType {
                marker: other,
                expected: "list",
            }),
        }
    }

    /// Unpack a map header, returning the entry count.
    pub fn unpack_map_header(&mut self) -> Result<usize, PackStreamError> {
        let marker = self.input.read_u8()?;
        if high_nibble(marker) == TINY_MAP_BASE {
            return Ok(low_nibble(marker));
        }
        match marker {
            MAP_8 => Ok(self.input.read_u8()? as usize),
            MAP_16 => Ok(self.input.read_u16()? as usize),
            MAP_32 => {
                let size = self.read_size_32()?;
                Self::represent(size, "map (MAP_32)")
            }
            other => Err(PackStreamError::UnexpectedType {
                marker: other,
                expected: "map",
            }),
        }
    }

    /// Unpack a structure header, returning the field count. The signature
    /// byte follows and is read with [`Unpacker::unpack_struct_signature`].
    pub fn unpack_struct_header(&mut self) -> Result<usize, PackStreamError> {
        let marker = self.input.read_u8()?;
        if high_nibble(marker) == TINY_STRUCT_BASE {
            return Ok(low_nibble(marker));
        }
        match marker {
            STRUCT_8 => Ok(self.input.read_u8()? as usize),
            STRUCT_16 => Ok(self.input.read_u16()? as usize),
            // 0xDE (a hypothetical STRUCT_32) is reserved, like the rest.
            other => Err(PackStreamError::UnexpectedType {
                marker: other,
                expected: "struct",
            }),
        }
    }

    /// Read the signature byte following a structure header.
    pub fn unpack_struct_signature(&mut self) -> Result<u8, PackStreamError> {
        self.input.read_u8()
    }

    /// Unpack a full map.
    pub fn unpack_map(&mut self) -> Result<ValueMap, PackStreamError> {
        let size = self.unpack_map_header()?;
        let mut map = ValueMap::with_capacity(size.min(1024));
        for _ in 0..size {
            let key = self.unpack_string()?;
            let value = self.unpack_value()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Unpack a full list.
    pub fn unpack_list(&mut self) -> Result<Vec<Value>, PackStreamError> {
        let size = self.unpack_list_header()?;
        let mut items = Vec::with_capacity(size.min(1024));
        for _ in 0..size {
            items.push(self.unpack_value()?);
        }
        Ok(items)
    }

    /// Unpack any value, dispatching on the peeked type.
    pub fn unpack_value(&mut self) -> Result<Value, PackStreamError> {
        match self.peek_next_type()? {
            PackType::Null => {
                self.unpack_null()?;
                Ok(Value::Null)
            }
            PackType::Boolean => Ok(Value::Bool(self.unpack_bool()?)),
            PackType::Integer => Ok(Value::Int(self.unpack_int()?)),
            PackType::Float => Ok(Value::Float(self.unpack_float()?)),
            PackType::Bytes => Ok(Value::Bytes(self.unpack_bytes()?)),
            PackType::String => Ok(Value::String(self.unpack_string()?)),
            PackType::List => Ok(Value::List(self.unpack_list()?)),
            PackType::Map => Ok(Value::Map(self.unpack_map()?)),
            PackType::Struct => {
                let size = self.unpack_struct_header()?;
                let signature = self.unpack_struct_signature()?;
                let mut fields = Vec::with_capacity(size.min(64));
                for _ in 0..size {
                    fields.push(self.unpack_value()?);
                }
                Ok(Value::Struct(Structure::new(signature, fields)))
            }
        }
    }

    fn read_size_32(&mut self) -> Result<u32, PackStreamError> {
        self.input.read_u32()
    }

    fn represent(size: u32, kind: &'static str) -> Result<usize, PackStreamError> {
        usize::try_from(size).map_err(|_| PackStreamError::CannotRepresent {
            kind,
            size: size as u64,
        })
    }

    fn read_raw(&mut self, size: usize) -> Result<Vec<u8>, PackStreamError> {
        let mut data = vec![0; size];
        self.input.read_bytes(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::test_support::VecInput;

    fn unpacker(data: &[u8]) -> Unpacker<VecInput> {
        Unpacker::new(VecInput::new(data.to_vec()))
    }

    #[test]
    fn test_unpack_null() {
        unpacker(&[0xC0]).unpack_null().unwrap();

        let err = unpacker(&[0xC3]).unpack_null().unwrap_err();
        assert!(matches!(
            err,
            PackStreamError::UnexpectedType { marker: 0xC3, .. }
        ));
    }

    #[test]
    fn test_unpack_bool() {
        assert!(unpacker(&[0xC3]).unpack_bool().unwrap());
        assert!(!unpacker(&[0xC2]).unpack_bool().unwrap());
        assert!(unpacker(&[0x01]).unpack_bool().is_err());
    }

    #[test]
    fn test_unpack_int_widths() {
        assert_eq!(unpacker(&[0x00]).unpack_int().unwrap(), 0);
        assert_eq!(unpacker(&[0x7F]).unpack_int().unwrap(), 127);
        assert_eq!(unpacker(&[0xF0]).unpack_int().unwrap(), -16);
        assert_eq!(unpacker(&[0xC8, 0xEF]).unpack_int().unwrap(), -17);
        assert_eq!(unpacker(&[0xC9, 0x03, 0xE8]).unpack_int().unwrap(), 1000);
        assert_eq!(
            unpacker(&[0xCA, 0x00, 0x01, 0x86, 0xA0]).unpack_int().unwrap(),
            100000
        );
        assert_eq!(
            unpacker(&[0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
                .unpack_int()
                .unwrap(),
            i64::MAX
        );
    }

    #[test]
    fn test_unpack_float() {
        let mut data = vec![0xC1];
        data.extend_from_slice(&1.25f64.to_be_bytes());
        assert_eq!(unpacker(&data).unpack_float().unwrap(), 1.25);
    }

    #[test]
    fn test_unpack_string() {
        assert_eq!(unpacker(&[0x80]).unpack_string().unwrap(), "");
        assert_eq!(
            unpacker(&[0x85, b'h', b'e', b'l', b'l', b'o'])
                .unpack_string()
                .unwrap(),
            "hello"
        );

        let mut data = vec![0xD0, 20];
        data.extend_from_slice(&[b'a'; 20]);
        assert_eq!(unpacker(&data).unpack_string().unwrap(), "a".repeat(20));
    }

    #[test]
    fn test_unpack_string_invalid_utf8() {
        let err = unpacker(&[0x82, 0xFF, 0xFE]).unpack_string().unwrap_err();
        assert!(matches!(err, PackStreamError::InvalidUtf8(_)));
    }

    #[test]
    fn test_unpack_bytes() {
        assert_eq!(
            unpacker(&[0xCC, 0x03, 1, 2, 3]).unpack_bytes().unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_unpack_headers() {
        assert_eq!(unpacker(&[0x93]).unpack_list_header().unwrap(), 3);
        assert_eq!(unpacker(&[0xD4, 20]).unpack_list_header().unwrap(), 20);
        assert_eq!(unpacker(&[0xA1]).unpack_map_header().unwrap(), 1);
        assert_eq!(
            unpacker(&[0xD9, 0x01, 0x00]).unpack_map_header().unwrap(),
            256
        );
        assert_eq!(unpacker(&[0xB2]).unpack_struct_header().unwrap(), 2);
        assert_eq!(unpacker(&[0xDC, 20]).unpack_struct_header().unwrap(), 20);
        assert_eq!(
            unpacker(&[0xDD, 0x01, 0x00]).unpack_struct_header().unwrap(),
            256
        );
    }

    #[test]
    fn test_reserved_markers_rejected() {
        for marker in [0xC4u8, 0xC7, 0xCF, 0xD3, 0xD7, 0xDB, 0xDE, 0xDF, 0xE0, 0xEF] {
            let err = unpacker(&[marker]).unpack_value().unwrap_err();
            assert!(
                matches!(err, PackStreamError::UnexpectedType { marker: m, .. } if m == marker),
                "0x{marker:02X} must be rejected"
            );
        }
    }

    #[test]
    fn test_struct_32_marker_rejected() {
        // 0xDE would be STRUCT_32 if it existed; it stays reserved.
        let err = unpacker(&[0xDE, 0x00, 0x00, 0x00, 0x01, 0x70])
            .unpack_struct_header()
            .unwrap_err();
        assert!(matches!(
            err,
            PackStreamError::UnexpectedType { marker: 0xDE, .. }
        ));
    }

    #[test]
    fn test_peek_next_type() {
        assert_eq!(unpacker(&[0xC0]).peek_next_type().unwrap(), PackType::Null);
        assert_eq!(
            unpacker(&[0xC3]).peek_next_type().unwrap(),
            PackType::Boolean
        );
        assert_eq!(
            unpacker(&[0x2A]).peek_next_type().unwrap(),
            PackType::Integer
        );
        assert_eq!(
            unpacker(&[0xF5]).peek_next_type().unwrap(),
            PackType::Integer
        );
        assert_eq!(unpacker(&[0xC1]).peek_next_type().unwrap(), PackType::Float);
        assert_eq!(
            unpacker(&[0x85]).peek_next_type().unwrap(),
            PackType::String
        );
        assert_eq!(unpacker(&[0xCC]).peek_next_type().unwrap(), PackType::Bytes);
        assert_eq!(unpacker(&[0x91]).peek_next_type().unwrap(), PackType::List);
        assert_eq!(unpacker(&[0xA0]).peek_next_type().unwrap(), PackType::Map);
        assert_eq!(
            unpacker(&[0xB1]).peek_next_type().unwrap(),
            PackType::Struct
        );
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut u = unpacker(&[0x05]);
        assert_eq!(u.peek_next_type().unwrap(), PackType::Integer);
        assert_eq!(u.unpack_int().unwrap(), 5);
    }

    #[test]
    fn test_unpack_nested_value() {
        // [{"x": 5}]
        let data = [0x91, 0xA1, 0x81, b'x', 0x05];
        let value = unpacker(&data).unpack_value().unwrap();
        let list = value.as_list().unwrap();
        assert_eq!(list.len(), 1);
        let map = list[0].as_map().unwrap();
        assert_eq!(map.get("x").and_then(Value::as_int), Some(5));
    }

    #[test]
    fn test_unpack_struct_value() {
        let data = [0xB1, 0x4E, 0x01];
        let value = unpacker(&data).unpack_value().unwrap();
        let s = value.as_struct().unwrap();
        assert_eq!(s.signature, 0x4E);
        assert_eq!(s.fields, vec![Value::Int(1)]);
    }

    #[test]
    fn test_truncated_input_is_end_of_stream() {
        let err = unpacker(&[0xC9]).unpack_int().unwrap_err();
        assert!(matches!(err, PackStreamError::EndOfStream { .. }));
    }
}
