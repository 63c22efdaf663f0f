//! Little-endian primitives for the broadcasting wire format
//!
//! Strings are UTF-8 with a u16 length prefix.

use crate::error::{CodecError, Result};

/// Cursor over an inbound frame
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let truncated = CodecError::Truncated {
            needed: len,
            offset: self.offset,
            len: self.data.len(),
        };
        let end = self.offset.checked_add(len).ok_or(truncated.clone())?;
        let slice = self.data.get(self.offset..end).ok_or(truncated)?;
        self.offset = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.read_exact(N)?);
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Raw float, NaN and infinities included
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let length = usize::from(self.read_u16()?);
        let offset = self.offset;
        let raw = self.read_exact(length)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { offset })
    }
}

/// Builder for outbound frames
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    pub fn new(message_type: u8) -> Self {
        let mut buffer = Vec::with_capacity(32);
        buffer.push(message_type);
        Self { buffer }
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buffer.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f32(mut self, value: f32) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn string(mut self, value: &str) -> Result<Self> {
        let bytes = value.as_bytes();
        let length =
            u16::try_from(bytes.len()).map_err(|_| CodecError::StringTooLong(bytes.len()))?;
        self.buffer.extend_from_slice(&length.to_le_bytes());
        self.buffer.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}
