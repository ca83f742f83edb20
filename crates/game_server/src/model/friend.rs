//! Friend list with case-insensitive unique names.

use super::CharacterId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub name: String,
    pub friend_id: CharacterId,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub memo: String,
}

impl FriendEntry {
    pub fn new(name: impl Into<String>, friend_id: CharacterId) -> Self {
        Self {
            name: name.into(),
            friend_id,
            status: 0,
            memo: String::new(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FriendListError {
    #[error("{0} is already on the friend list")]
    Duplicate(String),
    #[error("friend list is full ({0} entries)")]
    Full(usize),
    #[error("{0} is not on the friend list")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FriendList {
    entries: Vec<FriendEntry>,
}

impl FriendList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FriendEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FriendEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn add(&mut self, entry: FriendEntry, capacity: usize) -> Result<(), FriendListError> {
        if self.contains(&entry.name) {
            return Err(FriendListError::Duplicate(entry.name));
        }
        if self.entries.len() >= capacity {
            return Err(FriendListError::Full(capacity));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<FriendEntry, FriendListError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FriendListError::NotFound(name.to_string()))?;
        Ok(self.entries.remove(index))
    }

    pub fn set_memo(&mut self, name: &str, memo: String) -> Result<&FriendEntry, FriendListError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FriendListError::NotFound(name.to_string()))?;
        entry.memo = memo;
        Ok(entry)
    }
}
