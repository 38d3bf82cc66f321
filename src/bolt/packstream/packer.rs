//! PackStream packer.

use super::io::PackOutput;
use super::marker::*;
use super::value::{Structure, Value, ValueMap};
use super::PackStreamError;

/// Streaming PackStream serializer over a [`PackOutput`].
pub struct Packer<O: PackOutput> {
    out: O,
}

impl<O: PackOutput> Packer<O> {
    /// Create a packer writing to `out`.
    pub fn new(out: O) -> Self {
        Self { out }
    }

    /// Access the underlying output.
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.out
    }

    /// Consume the packer, returning the output.
    pub fn into_output(self) -> O {
        self.out
    }

    /// Flush the underlying output.
    pub fn flush(&mut self) -> Result<(), PackStreamError> {
        self.out.flush()
    }

    /// Pack a null marker.
    pub fn pack_null(&mut self) -> Result<(), PackStreamError> {
        self.out.write_u8(NULL)
    }

    /// Pack a boolean.
    pub fn pack_bool(&mut self, value: bool) -> Result<(), PackStreamError> {
        self.out.write_u8(if value { TRUE } else { FALSE })
    }

    /// Pack an integer using the narrowest encoding that fits.
    pub fn pack_int(&mut self, value: i64) -> Result<(), PackStreamError> {
        if fits_tiny_int(value) {
            self.out.write_u8(value as u8)
        } else if (i8::MIN as i64..TINY_INT_MIN).contains(&value) {
            self.out.write_u8(INT_8)?;
            self.out.write_u8(value as u8)
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
            self.out.write_u8(INT_16)?;
            self.out.write_u16(value as u16)
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.out.write_u8(INT_32)?;
            self.out.write_u32(value as u32)
        } else {
            self.out.write_u8(INT_64)?;
            self.out.write_u64(value as u64)
        }
    }

    /// Pack a float (always 64-bit).
    pub fn pack_float(&mut self, value: f64) -> Result<(), PackStreamError> {
        self.out.write_u8(FLOAT_64)?;
        self.out.write_f64(value)
    }

    /// Pack a byte array.
    pub fn pack_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        self.pack_bytes_header(value.len())?;
        self.out.write_bytes(value)
    }

    /// Pack a UTF-8 string.
    pub fn pack_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        let utf8 = value.as_bytes();
        self.pack_string_header(utf8.len())?;
        self.out.write_bytes(utf8)
    }

    /// Pack a bytes header. Bytes have no tiny form.
    pub fn pack_bytes_header(&mut self, size: usize) -> Result<(), PackStreamError> {
        if size <= i8::MAX as usize {
            self.out.write_u8(BYTES_8)?;
            self.out.write_u8(size as u8)
        } else if size < 0x1_0000 {
            self.out.write_u8(BYTES_16)?;
            self.out.write_u16(size as u16)
        } else {
            self.out.write_u8(BYTES_32)?;
            self.out.write_u32(size as u32)
        }
    }

    /// Pack a string header.
    pub fn pack_string_header(&mut self, size: usize) -> Result<(), PackStreamError> {
        if size <= TINY_SIZE_MAX {
            self.out.write_u8(TINY_STRING_BASE | size as u8)
        } else if size <= i8::MAX as usize {
            self.out.write_u8(STRING_8)?;
            self.out.write_u8(size as u8)
        } else if size < 0x1_0000 {
            self.out.write_u8(STRING_16)?;
            self.out.write_u16(size as u16)
        } else {
            self.out.write_u8(STRING_32)?;
            self.out.write_u32(size as u32)
        }
    }

    /// Pack a list header; `size` values must follow.
    pub fn pack_list_header(&mut self, size: usize) -> Result<(), PackStreamError> {
        if size <= TINY_SIZE_MAX {
            self.out.write_u8(TINY_LIST_BASE | size as u8)
        } else if size <= i8::MAX as usize {
            self.out.write_u8(LIST_8)?;
            self.out.write_u8(size as u8)
        } else if size < 0x1_0000 {
            self.out.write_u8(LIST_16)?;
            self.out.write_u16(size as u16)
        } else {
            self.out.write_u8(LIST_32)?;
            self.out.write_u32(size as u32)
        }
    }

    /// Pack a map header; `size` key/value pairs must follow.
    pub fn pack_map_header(&mut self, size: usize) -> Result<(), PackStreamError> {
        if size <= TINY_SIZE_MAX {
            self.out.write_u8(TINY_MAP_BASE | size as u8)
        } else if size <= i8::MAX as usize {
            self.out.write_u8(MAP_8)?;
            self.out.write_u8(size as u8)
        } else if size < 0x1_0000 {
            self.out.write_u8(MAP_16)?;
            self.out.write_u16(size as u16)
        } else {
            self.out.write_u8(MAP_32)?;
            self.out.write_u32(size as u32)
        }
    }

    /// Pack a structure header; `size` field values must follow.
    ///
    /// Structures cannot carry more than 65535 fields.
    pub fn pack_struct_header(&mut self, size: usize, signature: u8) -> Result<(), PackStreamError> {
        if size <= TINY_SIZE_MAX {
            self.out.write_u8(TINY_STRUCT_BASE | size as u8)?;
            self.out.write_u8(signature)
        } else if size <= i8::MAX as usize {
            self.out.write_u8(STRUCT_8)?;
            self.out.write_u8(size as u8)?;
            self.out.write_u8(signature)
        } else if size < 0x1_0000 {
            self.out.write_u8(STRUCT_16)?;
            self.out.write_u16(size as u16)?;
            self.out.write_u8(signature)
        } else {
            Err(PackStreamError::StructureFieldOverflow(size))
        }
    }

    /// Pack a list of values.
    pub fn pack_list(&mut self, values: &[Value]) -> Result<(), PackStreamError> {
        self.pack_list_header(values.len())?;
        for value in values {
            self.pack_value(value)?;
        }
        Ok(())
    }

    /// Pack a map in insertion order. Duplicate keys cannot occur; the map
    /// type already collapses them.
    pub fn pack_map(&mut self, map: &ValueMap) -> Result<(), PackStreamError> {
        self.pack_map_header(map.len())?;
        for (key, value) in map {
            self.pack_string(key)?;
            self.pack_value(value)?;
        }
        Ok(())
    }

    /// Pack a structure with its fields.
    pub fn pack_struct(&mut self, s: &Structure) -> Result<(), PackStreamError> {
        self.pack_struct_header(s.fields.len(), s.signature)?;
        for field in &s.fields {
            self.pack_value(field)?;
        }
        Ok(())
    }

    /// Pack any value.
    pub fn pack_value(&mut self, value: &Value) -> Result<(), PackStreamError> {
        match value {
            Value::Null => self.pack_null(),
            Value::Bool(b) => self.pack_bool(*b),
            Value::Int(i) => self.pack_int(*i),
            Value::Float(f) => self.pack_float(*f),
            Value::Bytes(b) => self.pack_bytes(b),
            Value::String(s) => self.pack_string(s),
            Value::List(l) => self.pack_list(l),
            Value::Map(m) => self.pack_map(m),
            Value::Struct(s) => self.pack_struct(s),
        }
    }
}
