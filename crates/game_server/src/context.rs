//! Shared services handed to every packet handler.

use crate::broadcast::GuildCache;
use crate::config::GameSettings;
use crate::directory::Directory;
use crate::notify::{NotificationSink, TracingSink};
use crate::persistence::Persistence;
use crate::trade::TradeRegistry;
use std::sync::Arc;

/// Everything a handler may reach beyond its own session.
///
/// One context is shared by every hosting instance in the process, so a map
/// host and a dungeon host see the same directory, trades and guild cache.
pub struct ServerContext {
    pub directory: Arc<Directory>,
    pub persistence: Arc<dyn Persistence>,
    pub notifier: Arc<dyn NotificationSink>,
    pub trades: TradeRegistry,
    pub guilds: GuildCache,
    pub settings: GameSettings,
}

impl ServerContext {
    /// A context with a fresh directory and a log-only notification sink.
    pub fn new(persistence: Arc<dyn Persistence>, settings: GameSettings) -> Self {
        Self {
            directory: Arc::new(Directory::new()),
            persistence,
            notifier: Arc::new(TracingSink),
            trades: TradeRegistry::default(),
            guilds: GuildCache::default(),
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }
}
