use super::{CharacterId, FriendList, GuildId, Inventory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The character's companion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub partner_type: u32,
    #[serde(default)]
    pub ride_unlocks: BTreeSet<u32>,
}

impl Partner {
    pub fn can_ride(&self, partner_type: u32) -> bool {
        self.ride_unlocks.contains(&partner_type)
    }

    /// Returns `false` when the ride was already unlocked.
    pub fn unlock_ride(&mut self, partner_type: u32) -> bool {
        self.ride_unlocks.insert(partner_type)
    }
}

/// A player's persistent avatar as held in memory while online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub map_id: u32,
    pub inventory: Inventory,
    #[serde(default)]
    pub friends: FriendList,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub quests: BTreeSet<u16>,
    #[serde(default)]
    pub encyclopedia: BTreeSet<u32>,
    #[serde(default)]
    pub partner: Partner,
}

impl Character {
    pub fn new(id: CharacterId, name: impl Into<String>, inventory_capacity: u16) -> Self {
        Self {
            id,
            name: name.into(),
            map_id: 0,
            inventory: Inventory::with_capacity(inventory_capacity),
            friends: FriendList::default(),
            guild_id: None,
            quests: BTreeSet::new(),
            encyclopedia: BTreeSet::new(),
            partner: Partner::default(),
        }
    }
}

/// A persistent player group. Only the member id roster is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub members: Vec<CharacterId>,
}
