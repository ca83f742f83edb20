//! Cross-instance session directory.
//!
//! Every hosting instance in the process (map hosts and dungeon hosts) shares
//! one [`Directory`]. It holds weak references only: a session is owned by
//! its connection worker, and a lookup never hands out a session whose
//! connection has already been marked closed.

use crate::error::DirectoryError;
use crate::model::CharacterId;
use crate::session::{ConnectionId, Instance, Session};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::debug;

struct HostedSession {
    connection: ConnectionId,
    instance: Instance,
    session: Weak<Session>,
}

impl HostedSession {
    fn live(&self) -> Option<Arc<Session>> {
        self.session.upgrade().filter(|s| s.is_connected())
    }
}

#[derive(Default)]
struct DirectoryIndex {
    by_character: HashMap<CharacterId, HostedSession>,
    by_handle: HashMap<(u8, u32), (CharacterId, ConnectionId)>,
}

#[derive(Default)]
pub struct Directory {
    index: RwLock<DirectoryIndex>,
    next_handle: AtomicU32,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next per-map handle. Unique across instances so a session keeps a
    /// distinct handle whichever host it lands on; zero is never issued.
    pub fn allocate_handle(&self) -> u32 {
        loop {
            let handle = self.next_handle.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if handle != 0 {
                return handle;
            }
        }
    }

    /// Makes `session` reachable by character id and by `(channel, handle)`.
    ///
    /// Stale entries left by sessions that are closed or dropped are
    /// replaced; a live one is an error.
    pub async fn register(&self, session: &Arc<Session>) -> Result<(), DirectoryError> {
        let mut index = self.index.write().await;
        let character_id = session.character_id();
        let key = (session.channel(), session.handle());

        if index
            .by_character
            .get(&character_id)
            .and_then(HostedSession::live)
            .is_some()
        {
            return Err(DirectoryError::AlreadyOnline(character_id));
        }
        if let Some((holder, _)) = index.by_handle.get(&key) {
            if index.by_character.get(holder).and_then(HostedSession::live).is_some() {
                return Err(DirectoryError::HandleInUse {
                    handle: key.1,
                    channel: key.0,
                });
            }
        }

        index.by_character.insert(
            character_id,
            HostedSession {
                connection: session.id(),
                instance: session.instance(),
                session: Arc::downgrade(session),
            },
        );
        index.by_handle.insert(key, (character_id, session.id()));
        debug!(
            character_id,
            handle = key.1,
            channel = key.0,
            instance = %session.instance(),
            "registered session"
        );
        Ok(())
    }

    /// Removes the entries for `session`, leaving any newer registration for
    /// the same character untouched.
    pub async fn unregister(&self, session: &Session) {
        let mut index = self.index.write().await;
        let character_id = session.character_id();

        if index
            .by_character
            .get(&character_id)
            .is_some_and(|entry| entry.connection == session.id())
        {
            index.by_character.remove(&character_id);
        }
        let key = (session.channel(), session.handle());
        if index
            .by_handle
            .get(&key)
            .is_some_and(|(_, connection)| *connection == session.id())
        {
            index.by_handle.remove(&key);
        }
        debug!(character_id, "unregistered session");
    }

    pub async fn find_by_character_id(&self, character_id: CharacterId) -> Option<Arc<Session>> {
        self.index
            .read()
            .await
            .by_character
            .get(&character_id)
            .and_then(HostedSession::live)
    }

    /// Resolves a per-map handle on the requester's channel.
    pub async fn find_by_handle_and_channel(&self, handle: u32, channel: u8) -> Option<Arc<Session>> {
        let index = self.index.read().await;
        let (character_id, connection) = index.by_handle.get(&(channel, handle))?;
        index
            .by_character
            .get(character_id)
            .filter(|entry| entry.connection == *connection)
            .and_then(HostedSession::live)
    }

    /// Live sessions hosted by `instance`.
    pub async fn online_count(&self, instance: Instance) -> usize {
        self.index
            .read()
            .await
            .by_character
            .values()
            .filter(|entry| entry.instance == instance && entry.live().is_some())
            .count()
    }
}
