//! Bounds-checked cursors over packet buffers, and the MQTT 5 primitive
//! encodings built on them.
//!
//! Every read and write checks the remaining length first and reports
//! [`CodecError::UnexpectedEnd`] or [`CodecError::BufferOverflow`] instead of
//! indexing past the end of the buffer.
//!
//! | Primitive               | Encoding                                          |
//! |-------------------------|---------------------------------------------------|
//! | Byte / 2 / 4 byte int   | big-endian                                        |
//! | Variable Byte Integer   | 7 bits per byte, MSB continues, at most 4 bytes   |
//! | UTF-8 string / binary   | 2-byte big-endian length, then the raw bytes      |
//! | String pair             | two strings, key then value                       |
//! | Property block          | Variable Byte Integer length, then `(id, value)`* |

use alloc::string::String;
use alloc::vec::Vec;

use super::error::CodecError;
use super::property::{Properties, PropertyId, PropertyType, PropertyValue};

/// Largest value a Variable Byte Integer can carry.
pub const VAR_INT_MAX: u32 = 268_435_455;

/// Longest string or binary field the 2-byte length prefix allows.
pub const FIELD_MAX: usize = u16::MAX as usize;

/// Encode `value` as a Variable Byte Integer in its minimal form.
pub fn encode_var_int(mut value: u32) -> Result<heapless::Vec<u8, 4>, CodecError> {
    if value > VAR_INT_MAX {
        return Err(CodecError::ValueOutOfRange);
    }
    let mut encoded = heapless::Vec::new();
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        encoded.push(byte).map_err(|_| CodecError::ValueOutOfRange)?;
        if value == 0 {
            return Ok(encoded);
        }
    }
}

/// Number of bytes `value` takes as a Variable Byte Integer.
pub fn size_var_int(value: u32) -> Result<usize, CodecError> {
    match value {
        0..=127 => Ok(1),
        128..=16_383 => Ok(2),
        16_384..=2_097_151 => Ok(3),
        2_097_152..=VAR_INT_MAX => Ok(4),
        _ => Err(CodecError::ValueOutOfRange),
    }
}

/// Size of a length-prefixed UTF-8 string.
pub fn size_string(value: &str) -> Result<usize, CodecError> {
    size_binary(value.as_bytes())
}

/// Size of length-prefixed binary data.
pub fn size_binary(value: &[u8]) -> Result<usize, CodecError> {
    if value.len() > FIELD_MAX {
        return Err(CodecError::StringTooLong { len: value.len() });
    }
    Ok(2 + value.len())
}

fn size_property_value(value: &PropertyValue) -> Result<usize, CodecError> {
    Ok(match value {
        PropertyValue::Byte(_) => 1,
        PropertyValue::TwoByteInteger(_) => 2,
        PropertyValue::FourByteInteger(_) => 4,
        PropertyValue::VariableByteInteger(v) => size_var_int(*v)?,
        PropertyValue::String(s) => size_string(s)?,
        PropertyValue::Binary(b) => size_binary(b)?,
        PropertyValue::VariableByteIntegers(_) => 0,
    })
}

/// Size of the entries of a property block, without its length prefix.
fn size_property_entries(properties: &Properties) -> Result<usize, CodecError> {
    let mut total = 0usize;
    for (id, value) in properties.iter() {
        let id_len = size_var_int(id as u32)?;
        match value {
            PropertyValue::VariableByteIntegers(list) => {
                for v in list {
                    total += id_len + size_var_int(*v)?;
                }
            }
            other => total += id_len + size_property_value(other)?,
        }
    }
    let pair_id_len = size_var_int(PropertyId::UserProperty as u32)?;
    for (key, value) in properties.user_properties() {
        total += pair_id_len + size_string(key)? + size_string(value)?;
    }
    Ok(total)
}

/// Size of a complete property block, length prefix included.
pub fn size_properties(properties: &Properties) -> Result<usize, CodecError> {
    let entries = size_property_entries(properties)?;
    let entries_len = u32::try_from(entries).map_err(|_| CodecError::ValueOutOfRange)?;
    Ok(size_var_int(entries_len)? + entries)
}

/// A read position inside one packet body.
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail with [`CodecError::TrailingBytes`] unless every byte was consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEnd)?;
        let bytes = self.buf.get(self.pos..end).ok_or(CodecError::UnexpectedEnd)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a big-endian 16-bit integer.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian 32-bit integer.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a Variable Byte Integer.
    pub fn read_var_int(&mut self) -> Result<u32, CodecError> {
        let mut value = 0u32;
        for i in 0..4 {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::MalformedVariableInteger)
    }

    /// Read length-prefixed binary data.
    pub fn read_binary(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u16()?;
        self.read_bytes(usize::from(len))
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_binary()?;
        let s = core::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(String::from(s))
    }

    /// Read a key/value string pair.
    pub fn read_string_pair(&mut self) -> Result<(String, String), CodecError> {
        let key = self.read_string()?;
        let value = self.read_string()?;
        Ok((key, value))
    }

    /// Read a property block.
    ///
    /// The block is decoded through a sub-cursor bounded by its declared
    /// length, so a property can never read into the fields that follow.
    pub fn read_properties(&mut self) -> Result<Properties, CodecError> {
        let len = self.read_var_int()?;
        let block = self.read_bytes(len as usize)?;
        let mut inner = ReadCursor::new(block);
        let mut properties = Properties::new();

        while !inner.is_empty() {
            let raw = inner.read_var_int()?;
            let id = PropertyId::from_u32(raw).ok_or(CodecError::UnknownProperty { id: raw })?;
            let value = match id.property_type() {
                PropertyType::Utf8StringPair => {
                    let (key, value) = inner.read_string_pair()?;
                    properties.push_user_property(key, value);
                    continue;
                }
                PropertyType::VariableByteIntegerArray => {
                    let value = inner.read_var_int()?;
                    properties.push_variable_integer(id, value)?;
                    continue;
                }
                PropertyType::Byte => PropertyValue::Byte(inner.read_u8()?),
                PropertyType::TwoByteInteger => PropertyValue::TwoByteInteger(inner.read_u16()?),
                PropertyType::FourByteInteger => PropertyValue::FourByteInteger(inner.read_u32()?),
                PropertyType::VariableByteInteger => {
                    PropertyValue::VariableByteInteger(inner.read_var_int()?)
                }
                PropertyType::Utf8String => PropertyValue::String(inner.read_string()?),
                PropertyType::BinaryData => PropertyValue::Binary(Vec::from(inner.read_binary()?)),
            };
            if properties.contains(id) {
                return Err(CodecError::DuplicateProperty { id: id as u8 });
            }
            properties.set(id, value)?;
        }
        Ok(properties)
    }
}

/// Location of a packet identifier inside an encoded frame.
///
/// The codec writes a zero placeholder and hands back the slot; the flow
/// controller writes the allocated identifier through [`IdSlot::patch`] once
/// one is available.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct IdSlot {
    offset: usize,
}

impl IdSlot {
    /// Width of a packet identifier on the wire.
    pub const WIDTH: usize = 2;

    /// Byte offset of the identifier from the start of the frame.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Write `id` into `frame` at this slot.
    pub fn patch(&self, frame: &mut [u8], id: u16) -> Result<(), CodecError> {
        let end = self.offset + Self::WIDTH;
        let target = frame.get_mut(self.offset..end).ok_or(CodecError::BufferOverflow)?;
        target.copy_from_slice(&id.to_be_bytes());
        Ok(())
    }
}

/// A write position inside a pre-sized output buffer.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
    id_slot: Option<IdSlot>,
}

impl<'a> WriteCursor<'a> {
    /// Start writing at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            id_slot: None,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The slot recorded by the last [`WriteCursor::write_packet_id`].
    pub fn id_slot(&self) -> Option<IdSlot> {
        self.id_slot
    }

    /// Copy `bytes` to the output.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos.checked_add(bytes.len()).ok_or(CodecError::BufferOverflow)?;
        let target = self.buf.get_mut(self.pos..end).ok_or(CodecError::BufferOverflow)?;
        target.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.write_bytes(&[value])
    }

    /// Write a big-endian 16-bit integer.
    pub fn write_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write a big-endian 32-bit integer.
    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write a Variable Byte Integer.
    pub fn write_var_int(&mut self, value: u32) -> Result<(), CodecError> {
        let encoded = encode_var_int(value)?;
        self.write_bytes(&encoded)
    }

    /// Write length-prefixed binary data.
    pub fn write_binary(&mut self, value: &[u8]) -> Result<(), CodecError> {
        let len = u16::try_from(value.len()).map_err(|_| CodecError::StringTooLong { len: value.len() })?;
        self.write_u16(len)?;
        self.write_bytes(value)
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.write_binary(value.as_bytes())
    }

    /// Write a key/value string pair.
    pub fn write_string_pair(&mut self, key: &str, value: &str) -> Result<(), CodecError> {
        self.write_string(key)?;
        self.write_string(value)
    }

    /// Write a packet identifier and remember where it went.
    pub fn write_packet_id(&mut self, id: u16) -> Result<IdSlot, CodecError> {
        let slot = IdSlot { offset: self.pos };
        self.write_u16(id)?;
        self.id_slot = Some(slot);
        Ok(slot)
    }

    /// Write a complete property block, length prefix included.
    ///
    /// Typed properties go out in ascending identifier order, followed by
    /// User Properties in insertion order.
    pub fn write_properties(&mut self, properties: &Properties) -> Result<(), CodecError> {
        let entries = size_property_entries(properties)?;
        let entries_len = u32::try_from(entries).map_err(|_| CodecError::ValueOutOfRange)?;
        self.write_var_int(entries_len)?;
        let start = self.pos;

        for (id, value) in properties.iter() {
            match value {
                PropertyValue::VariableByteIntegers(list) => {
                    for v in list {
                        self.write_var_int(id as u32)?;
                        self.write_var_int(*v)?;
                    }
                }
                PropertyValue::Byte(v) => {
                    self.write_var_int(id as u32)?;
                    self.write_u8(*v)?;
                }
                PropertyValue::TwoByteInteger(v) => {
                    self.write_var_int(id as u32)?;
                    self.write_u16(*v)?;
                }
                PropertyValue::FourByteInteger(v) => {
                    self.write_var_int(id as u32)?;
                    self.write_u32(*v)?;
                }
                PropertyValue::VariableByteInteger(v) => {
                    self.write_var_int(id as u32)?;
                    self.write_var_int(*v)?;
                }
                PropertyValue::String(s) => {
                    self.write_var_int(id as u32)?;
                    self.write_string(s)?;
                }
                PropertyValue::Binary(b) => {
                    self.write_var_int(id as u32)?;
                    self.write_binary(b)?;
                }
            }
        }
        for (key, value) in properties.user_properties() {
            self.write_var_int(PropertyId::UserProperty as u32)?;
            self.write_string_pair(key, value)?;
        }

        let written = self.pos - start;
        if written != entries {
            return Err(CodecError::SizeMismatch {
                expected: entries,
                actual: written,
            });
        }
        Ok(())
    }
}
