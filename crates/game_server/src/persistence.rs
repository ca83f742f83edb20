//! Persistence bridge.
//!
//! Handlers mutate in-memory state first and then issue a
//! [`PersistenceCommand`]. A failed command is logged by the dispatcher and
//! the in-memory change is kept; the store catches up on the next write of
//! the same record.
//!
//! [`MemoryStore`] is the bundled implementation. It keeps characters and
//! guilds in `DashMap`s, applies every command it accepts and can be seeded
//! from a JSON file. A store built with [`MemoryStore::recording`] also keeps
//! the accepted commands in order.

use crate::model::{Character, CharacterId, FriendEntry, Guild, GuildId, Inventory};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("character {0} not found")]
    CharacterNotFound(CharacterId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read seed data: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid seed data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Write requests issued by handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceCommand {
    CreateFriend {
        character_id: CharacterId,
        friend: FriendEntry,
    },
    DeleteFriend {
        character_id: CharacterId,
        friend_id: CharacterId,
    },
    UpdateFriendMemo {
        character_id: CharacterId,
        friend_id: CharacterId,
        memo: String,
    },
    UpdateItemList {
        character_id: CharacterId,
        inventory: Inventory,
    },
    CreateGuildMessage {
        guild_id: GuildId,
        sender_id: CharacterId,
        message: String,
    },
    RemoveQuest {
        character_id: CharacterId,
        quest_id: u16,
    },
    UnlockRide {
        character_id: CharacterId,
        partner_type: u32,
    },
}

impl PersistenceCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateFriend { .. } => "create_friend",
            Self::DeleteFriend { .. } => "delete_friend",
            Self::UpdateFriendMemo { .. } => "update_friend_memo",
            Self::UpdateItemList { .. } => "update_item_list",
            Self::CreateGuildMessage { .. } => "create_guild_message",
            Self::RemoveQuest { .. } => "remove_quest",
            Self::UnlockRide { .. } => "unlock_ride",
        }
    }
}

/// Result of a by-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    pub id: CharacterId,
    pub name: String,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load_character(&self, id: CharacterId) -> Result<Character, PersistenceError>;

    /// Case-insensitive lookup.
    async fn find_character_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CharacterSummary>, PersistenceError>;

    async fn load_guild(&self, id: GuildId) -> Result<Option<Guild>, PersistenceError>;

    async fn execute(&self, command: PersistenceCommand) -> Result<(), PersistenceError>;
}

#[derive(Debug, Default, Deserialize)]
struct SeedData {
    #[serde(default)]
    characters: Vec<Character>,
    #[serde(default)]
    guilds: Vec<Guild>,
}

/// A stored guild chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMessageRecord {
    pub sender_id: CharacterId,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    characters: DashMap<CharacterId, Character>,
    guilds: DashMap<GuildId, Guild>,
    guild_history: DashMap<GuildId, Vec<GuildMessageRecord>>,
    /// Present only on stores built with [`MemoryStore::recording`].
    executed: Option<Mutex<Vec<PersistenceCommand>>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also keeps every accepted command, for inspection.
    pub fn recording() -> Self {
        Self {
            executed: Some(Mutex::default()),
            ..Self::default()
        }
    }

    /// Loads characters and guilds from a JSON document of the form
    /// `{ "characters": [...], "guilds": [...] }`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let seed: SeedData = serde_json::from_str(&content)?;
        let store = Self::new();
        for character in seed.characters {
            store.insert_character(character);
        }
        for guild in seed.guilds {
            store.insert_guild(guild);
        }
        info!(
            "📦 Loaded {} characters and {} guilds from {}",
            store.characters.len(),
            store.guilds.len(),
            path.as_ref().display()
        );
        Ok(store)
    }

    pub fn insert_character(&self, character: Character) {
        self.characters.insert(character.id, character);
    }

    pub fn insert_guild(&self, guild: Guild) {
        self.guilds.insert(guild.id, guild);
    }

    /// The stored copy of a character.
    pub fn character(&self, id: CharacterId) -> Option<Character> {
        self.characters.get(&id).map(|c| c.clone())
    }

    pub fn guild_history(&self, id: GuildId) -> Vec<GuildMessageRecord> {
        self.guild_history
            .get(&id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Commands accepted so far, oldest first. Always empty unless the
    /// store was built with [`MemoryStore::recording`].
    pub fn executed(&self) -> Vec<PersistenceCommand> {
        self.executed
            .as_ref()
            .map(|log| log.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    /// While set, every call fails with [`PersistenceError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(PersistenceError::Unavailable("store is failing".into()));
        }
        Ok(())
    }

    fn with_character(
        &self,
        id: CharacterId,
        apply: impl FnOnce(&mut Character),
    ) -> Result<(), PersistenceError> {
        let mut character = self
            .characters
            .get_mut(&id)
            .ok_or(PersistenceError::CharacterNotFound(id))?;
        apply(&mut character);
        Ok(())
    }

    fn apply(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
        match command {
            PersistenceCommand::CreateFriend {
                character_id,
                friend,
            } => self.with_character(*character_id, |c| {
                let _ = c.friends.add(friend.clone(), usize::MAX);
            }),
            PersistenceCommand::DeleteFriend {
                character_id,
                friend_id,
            } => self.with_character(*character_id, |c| {
                let name = c
                    .friends
                    .iter()
                    .find(|f| f.friend_id == *friend_id)
                    .map(|f| f.name.clone());
                if let Some(name) = name {
                    let _ = c.friends.remove(&name);
                }
            }),
            PersistenceCommand::UpdateFriendMemo {
                character_id,
                friend_id,
                memo,
            } => self.with_character(*character_id, |c| {
                let name = c
                    .friends
                    .iter()
                    .find(|f| f.friend_id == *friend_id)
                    .map(|f| f.name.clone());
                if let Some(name) = name {
                    let _ = c.friends.set_memo(&name, memo.clone());
                }
            }),
            PersistenceCommand::UpdateItemList {
                character_id,
                inventory,
            } => self.with_character(*character_id, |c| c.inventory = inventory.clone()),
            PersistenceCommand::CreateGuildMessage {
                guild_id,
                sender_id,
                message,
            } => {
                self.guild_history
                    .entry(*guild_id)
                    .or_default()
                    .push(GuildMessageRecord {
                        sender_id: *sender_id,
                        message: message.clone(),
                    });
                Ok(())
            }
            PersistenceCommand::RemoveQuest {
                character_id,
                quest_id,
            } => self.with_character(*character_id, |c| {
                c.quests.remove(quest_id);
            }),
            PersistenceCommand::UnlockRide {
                character_id,
                partner_type,
            } => self.with_character(*character_id, |c| {
                c.partner.unlock_ride(*partner_type);
            }),
        }
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load_character(&self, id: CharacterId) -> Result<Character, PersistenceError> {
        self.check_available()?;
        self.character(id)
            .ok_or(PersistenceError::CharacterNotFound(id))
    }

    async fn find_character_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CharacterSummary>, PersistenceError> {
        self.check_available()?;
        Ok(self
            .characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| CharacterSummary {
                id: c.id,
                name: c.name.clone(),
            }))
    }

    async fn load_guild(&self, id: GuildId) -> Result<Option<Guild>, PersistenceError> {
        self.check_available()?;
        Ok(self.guilds.get(&id).map(|g| g.clone()))
    }

    async fn execute(&self, command: PersistenceCommand) -> Result<(), PersistenceError> {
        self.check_available()?;
        self.apply(&command)?;
        debug!(command = command.name(), "persisted");
        if let Some(log) = &self.executed {
            log.lock().unwrap_or_else(PoisonError::into_inner).push(command);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use std::io::Write;

    fn store_with_tai() -> MemoryStore {
        let store = MemoryStore::recording();
        let mut tai = Character::new(1, "Tai", 4);
        tai.quests.insert(12);
        store.insert_character(tai);
        store
    }

    #[tokio::test]
    async fn commands_are_applied_and_recorded() {
        let store = store_with_tai();
        store
            .execute(PersistenceCommand::RemoveQuest {
                character_id: 1,
                quest_id: 12,
            })
            .await
            .unwrap();

        assert!(store.character(1).unwrap().quests.is_empty());
        assert_eq!(store.executed().len(), 1);
    }

    #[tokio::test]
    async fn plain_store_keeps_no_command_log() {
        let store = MemoryStore::new();
        store.insert_character(Character::new(1, "Tai", 4));
        for partner_type in 0..1000 {
            store
                .execute(PersistenceCommand::UnlockRide {
                    character_id: 1,
                    partner_type,
                })
                .await
                .unwrap();
        }

        assert!(store.executed().is_empty());
        assert_eq!(store.character(1).unwrap().partner.ride_unlocks.len(), 1000);
    }

    #[tokio::test]
    async fn failing_store_records_nothing() {
        let store = store_with_tai();
        store.set_failing(true);

        let result = store
            .execute(PersistenceCommand::UnlockRide {
                character_id: 1,
                partner_type: 3,
            })
            .await;
        assert!(matches!(result, Err(PersistenceError::Unavailable(_))));
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn lookup_by_name_ignores_case() {
        let store = store_with_tai();
        let found = store.find_character_by_name("tAI").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert!(store.find_character_by_name("Matt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeds_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut sora = Character::new(2, "Sora", 2);
        sora.inventory.insert(Item::new(50, 3)).unwrap();
        let json = serde_json::json!({
            "characters": [sora],
            "guilds": [{ "id": 9, "name": "Chosen", "members": [2] }]
        });
        write!(file, "{json}").unwrap();

        let store = MemoryStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.load_character(2).await.unwrap().inventory.count(50), 3);
        assert_eq!(store.load_guild(9).await.unwrap().unwrap().members, vec![2]);
    }
}
