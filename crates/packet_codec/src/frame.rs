//! Frame splitting and the decoded [`Packet`] type.

use crate::error::PacketError;
use crate::reader::PacketReader;
use bytes::{Buf, Bytes, BytesMut};

/// Length prefix plus type identifier.
pub const HEADER_LEN: usize = 4;

/// Upper bound on a frame unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024;

/// A decoded packet: a type identifier and its still-encoded payload.
///
/// The payload is immutable; handlers obtain a fresh [`PacketReader`] and
/// consume fields in the order their packet type defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    type_id: u16,
    payload: Bytes,
}

impl Packet {
    pub fn new(type_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            payload: payload.into(),
        }
    }

    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(&self.payload)
    }

    /// Decodes exactly one complete frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < HEADER_LEN {
            return Err(PacketError::BufferUnderrun {
                needed: HEADER_LEN,
                remaining: frame.len(),
            });
        }
        let mut header = &frame[..HEADER_LEN];
        let declared = header.get_u16_le() as usize;
        let type_id = header.get_u16_le();
        if declared != frame.len() {
            return Err(PacketError::Protocol(format!(
                "declared length {declared} does not match frame length {}",
                frame.len()
            )));
        }
        Ok(Self::new(
            type_id,
            Bytes::copy_from_slice(&frame[HEADER_LEN..]),
        ))
    }
}

/// Splits an inbound byte stream into packets.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len: max_frame_len.clamp(HEADER_LEN, u16::MAX as usize),
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Takes the next complete frame off `buf`.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete. A declared
    /// length outside `HEADER_LEN..=max_frame_len` cannot be resynchronised,
    /// so everything buffered is discarded before the error is returned.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Packet>, PacketError> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let declared = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        if declared < HEADER_LEN || declared > self.max_frame_len {
            buf.clear();
            return Err(PacketError::Protocol(format!(
                "invalid declared frame length {declared} (allowed {HEADER_LEN}..={})",
                self.max_frame_len
            )));
        }
        if buf.len() < declared {
            buf.reserve(declared - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(declared);
        frame.advance(2);
        let type_id = frame.get_u16_le();
        Ok(Some(Packet::new(type_id, frame.freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PacketWriter;

    fn frame(type_id: u16, body: &[u8]) -> Bytes {
        let mut writer = PacketWriter::new(type_id);
        writer.write_bytes(body);
        writer.finish().unwrap()
    }

    #[test]
    fn waits_for_a_complete_frame() {
        let decoder = FrameDecoder::default();
        let full = frame(7, &[1, 2, 3]);
        let mut buf = BytesMut::from(&full[..5]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&full[5..]);

        let packet = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.type_id(), 7);
        assert_eq!(packet.payload().as_ref(), &[1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn splits_back_to_back_frames_in_order() {
        let decoder = FrameDecoder::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame(1, &[0xaa]));
        buf.extend_from_slice(&frame(2, &[]));

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!((first.type_id(), second.type_id()), (1, 2));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn invalid_length_discards_buffer() {
        let decoder = FrameDecoder::new(64);
        let mut buf = BytesMut::from(&[0x02, 0x00, 0x01, 0x00][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(PacketError::Protocol(_))
        ));
        assert!(buf.is_empty());

        let mut oversized = BytesMut::from(&[0xff, 0x00][..]);
        assert!(decoder.decode(&mut oversized).is_err());

        // the stream keeps working after the discard
        oversized.extend_from_slice(&frame(9, &[5]));
        assert_eq!(decoder.decode(&mut oversized).unwrap().unwrap().type_id(), 9);
    }

    #[test]
    fn from_frame_checks_declared_length() {
        let good = frame(3, &[1, 2]);
        assert_eq!(Packet::from_frame(&good).unwrap().type_id(), 3);

        let truncated = &good[..good.len() - 1];
        assert!(matches!(
            Packet::from_frame(truncated),
            Err(PacketError::Protocol(_))
        ));
        assert!(matches!(
            Packet::from_frame(&good[..2]),
            Err(PacketError::BufferUnderrun { .. })
        ));
    }
}
