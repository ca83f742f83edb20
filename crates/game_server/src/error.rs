//! Error types for the game server.
//!
//! Handler failures are split by the policy the dispatcher applies to them
//! rather than by where they came from:
//!
//! | variant | policy |
//! |---|---|
//! | [`HandlerError::Protocol`] | drop the packet, log, keep the connection |
//! | [`HandlerError::Validation`] | reply with a system message, no state change |
//! | [`HandlerError::Security`] | terminate the session, raise a moderation alert |
//! | [`HandlerError::Persistence`] | log only, in-memory state is kept |
//! | [`HandlerError::Internal`] | log with session context, keep the connection |

use crate::model::CharacterId;
use crate::persistence::PersistenceError;
use packet_codec::PacketError;
use thiserror::Error;

/// Errors surfaced by the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Network(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Outcome classes a packet handler can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] PacketError),

    /// Shown to the acting client as a system message.
    #[error("{0}")]
    Validation(String),

    /// A duplication or tampering attempt.
    #[error("security violation: {0}")]
    Security(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::Security(message.into())
    }
}

/// Handler table misconfiguration, fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("packet type {0} already has a handler")]
    DuplicateHandler(u16),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("character {0} already has a live session")]
    AlreadyOnline(CharacterId),
    #[error("handle {handle} is already in use on channel {channel}")]
    HandleInUse { handle: u32, channel: u8 },
}
