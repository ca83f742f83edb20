//! Frame builder.

use crate::error::PacketError;
use crate::frame::HEADER_LEN;
use crate::MAX_STRING_LEN;
use bytes::{BufMut, Bytes, BytesMut};

/// Builds one outbound frame.
///
/// The header is reserved up front and the length prefix is patched in
/// [`PacketWriter::finish`], so fields are simply appended in wire order.
///
/// ```
/// use packet_codec::{Packet, PacketWriter};
///
/// let mut writer = PacketWriter::new(2101);
/// writer.write_string("Bob").unwrap();
/// writer.write_u8(0);
/// let frame = writer.finish().unwrap();
///
/// let packet = Packet::from_frame(&frame).unwrap();
/// assert_eq!(packet.type_id(), 2101);
/// ```
#[derive(Debug, Clone)]
pub struct PacketWriter {
    type_id: u16,
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new(type_id: u16) -> Self {
        Self::with_capacity(type_id, 64)
    }

    pub fn with_capacity(type_id: u16, payload_capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload_capacity);
        buf.put_u16_le(0);
        buf.put_u16_le(type_id);
        Self { type_id, buf }
    }

    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16_le(value);
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64_le(value);
        self
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Writes a string with a one byte length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<&mut Self, PacketError> {
        if value.len() > MAX_STRING_LEN {
            return Err(PacketError::protocol(format!(
                "string of {} bytes exceeds the {MAX_STRING_LEN} byte limit",
                value.len()
            )));
        }
        self.buf.put_u8(value.len() as u8);
        self.buf.put_slice(value.as_bytes());
        Ok(self)
    }

    /// Writes a NUL-terminated string.
    pub fn write_zstring(&mut self, value: &str) -> Result<&mut Self, PacketError> {
        if value.as_bytes().contains(&0) {
            return Err(PacketError::protocol("string contains an interior NUL"));
        }
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        Ok(self)
    }

    /// Patches the length prefix and returns the finished frame.
    pub fn finish(mut self) -> Result<Bytes, PacketError> {
        let len = self.buf.len();
        let len = u16::try_from(len).map_err(|_| {
            PacketError::protocol(format!(
                "frame of {len} bytes for packet {} does not fit the length prefix",
                self.type_id
            ))
        })?;
        self.buf[..2].copy_from_slice(&len.to_le_bytes());
        Ok(self.buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_length_and_type() {
        let mut writer = PacketWriter::new(0x0203);
        writer.write_u32(0xdead_beef);
        let frame = writer.finish().unwrap();

        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..4], &[8, 0, 0x03, 0x02]);
        assert_eq!(&frame[4..], &0xdead_beefu32.to_le_bytes());
    }

    #[test]
    fn oversized_string_is_rejected() {
        let mut writer = PacketWriter::new(1);
        let long = "x".repeat(MAX_STRING_LEN + 1);

        assert!(matches!(
            writer.write_string(&long),
            Err(PacketError::Protocol(_))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut writer = PacketWriter::new(1);
        writer.write_bytes(&vec![0u8; u16::MAX as usize]);

        assert!(matches!(writer.finish(), Err(PacketError::Protocol(_))));
    }

    #[test]
    fn zstring_rejects_interior_nul() {
        let mut writer = PacketWriter::new(1);
        assert!(writer.write_zstring("a\0b").is_err());
    }
}
