//! # Packet Codec
//!
//! Binary encoding and decoding of the frames exchanged between game clients
//! and the Tamer game server.
//!
//! ## Wire Format
//!
//! ```text
//! frame   := len:u16le type:u16le payload[len - 4]
//! string  := n:u8 utf8[n]
//! zstring := utf8 0x00
//! ```
//!
//! `len` counts the whole frame, header included. Integers are little endian.
//! There is no self-describing schema: every packet type has a fixed field
//! sequence that the handler for that type reads in order.
//!
//! ## Components
//!
//! * [`PacketReader`] - sequential typed reads over a payload
//! * [`PacketWriter`] - builds a complete frame for one packet type
//! * [`FrameDecoder`] - splits a byte stream into [`Packet`]s
//!
//! The codec is stateless apart from the caller-owned buffers it is handed,
//! and an error never leaves a partially consumed frame behind.

mod error;
mod frame;
mod reader;
mod writer;

pub use error::PacketError;
pub use frame::{FrameDecoder, Packet, DEFAULT_MAX_FRAME_LEN, HEADER_LEN};
pub use reader::PacketReader;
pub use writer::PacketWriter;

/// Longest string accepted by the single-byte length prefix.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;
