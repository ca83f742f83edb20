use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// A read needed more bytes than the payload has left.
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    BufferUnderrun { needed: usize, remaining: usize },

    /// The frame or one of its fields is malformed.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl PacketError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
