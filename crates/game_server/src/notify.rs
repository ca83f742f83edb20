//! Best-effort outward notifications (chat relays, moderation alerts).

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    GuildChat,
    Moderation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub actor: String,
    pub message: String,
    /// RGB color tag for sinks that render it.
    pub color: u32,
    pub channel: u8,
}

impl Notification {
    pub const GUILD_COLOR: u32 = 0x00c0_ff00;
    pub const MODERATION_COLOR: u32 = 0x00ff_3030;

    pub fn guild_chat(actor: impl Into<String>, message: impl Into<String>, channel: u8) -> Self {
        Self {
            kind: NotificationKind::GuildChat,
            actor: actor.into(),
            message: message.into(),
            color: Self::GUILD_COLOR,
            channel,
        }
    }

    pub fn moderation(actor: impl Into<String>, message: impl Into<String>, channel: u8) -> Self {
        Self {
            kind: NotificationKind::Moderation,
            actor: actor.into(),
            message: message.into(),
            color: Self::MODERATION_COLOR,
            channel,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match notification.kind {
            NotificationKind::GuildChat => info!(
                actor = %notification.actor,
                channel = notification.channel,
                "💬 {}",
                notification.message
            ),
            NotificationKind::Moderation => warn!(
                actor = %notification.actor,
                channel = notification.channel,
                "🚨 {}",
                notification.message
            ),
        }
        Ok(())
    }
}

/// Hands `notification` to `sink` on a separate task; failures are logged
/// and go no further.
pub fn spawn_notify(sink: Arc<dyn NotificationSink>, notification: Notification) {
    tokio::spawn(async move {
        let kind = notification.kind;
        if let Err(e) = sink.notify(notification).await {
            warn!(?kind, "notification dropped: {}", e);
        }
    });
}
