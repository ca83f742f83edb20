//! Sequential payload reader.

use crate::error::PacketError;
use bytes::Buf;

/// Reads typed fields from a packet payload, strictly front to back.
///
/// Every read checks the remaining length first, so a short payload yields
/// [`PacketError::BufferUnderrun`] instead of a panic.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), PacketError> {
        if self.data.len() < needed {
            return Err(PacketError::BufferUnderrun {
                needed,
                remaining: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, PacketError> {
        self.ensure(1)?;
        Ok(self.data.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        self.ensure(2)?;
        Ok(self.data.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16, PacketError> {
        self.ensure(2)?;
        Ok(self.data.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        self.ensure(4)?;
        Ok(self.data.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        self.ensure(4)?;
        Ok(self.data.get_i32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, PacketError> {
        self.ensure(8)?;
        Ok(self.data.get_u64_le())
    }

    pub fn read_i64(&mut self) -> Result<i64, PacketError> {
        self.ensure(8)?;
        Ok(self.data.get_i64_le())
    }

    /// Borrows the next `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        self.ensure(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    /// Reads a string with a one byte length prefix.
    pub fn read_string(&mut self) -> Result<String, PacketError> {
        let len = self.read_u8()? as usize;
        let raw = self.read_bytes(len)?;
        decode_utf8(raw)
    }

    /// Reads a NUL-terminated string. The terminator is consumed.
    pub fn read_zstring(&mut self) -> Result<String, PacketError> {
        let Some(end) = self.data.iter().position(|b| *b == 0) else {
            return Err(PacketError::BufferUnderrun {
                needed: self.data.len() + 1,
                remaining: self.data.len(),
            });
        };
        let raw = self.read_bytes(end)?;
        self.data.advance(1);
        decode_utf8(raw)
    }
}

fn decode_utf8(raw: &[u8]) -> Result<String, PacketError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| PacketError::protocol(format!("string is not valid UTF-8: {e}")))
}
