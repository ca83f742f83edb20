//! Character state owned by a session while it is online.

mod character;
mod friend;
mod inventory;

pub use character::{Character, Guild, Partner};
pub use friend::{FriendEntry, FriendList, FriendListError};
pub use inventory::{Inventory, InventoryError, Item};

/// Durable character identifier.
pub type CharacterId = i64;

pub type GuildId = u32;
