//! Slot-addressed item storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stack of items.
///
/// `expires_at` is fixed when the item is created; stacks only merge when
/// both the item id and the expiry agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: u32,
    pub amount: u16,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl Item {
    pub fn new(item_id: u32, amount: u16) -> Self {
        Self {
            item_id,
            amount,
            expires_at: None,
        }
    }

    pub fn expiring(item_id: u32, amount: u16, expires_at: u64) -> Self {
        Self {
            item_id,
            amount,
            expires_at: Some(expires_at),
        }
    }

    fn stacks_with(&self, other: &Item) -> bool {
        self.item_id == other.item_id && self.expires_at == other.expires_at
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("slot {0} does not exist")]
    InvalidSlot(u16),
    #[error("slot {0} is empty")]
    EmptySlot(u16),
    #[error("slot {slot} holds {owned} but {requested} were requested")]
    Insufficient { slot: u16, owned: u16, requested: u16 },
    #[error("inventory is full")]
    Full,
}

/// Fixed-size inventory; each slot holds at most one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<Item>>,
}

impl Inventory {
    pub fn with_capacity(capacity: u16) -> Self {
        Self {
            slots: vec![None; capacity as usize],
        }
    }

    /// Builds an inventory from `(slot, item)` pairs. Out of range slots are
    /// rejected rather than silently dropped.
    pub fn from_slots(
        capacity: u16,
        items: impl IntoIterator<Item = (u16, Item)>,
    ) -> Result<Self, InventoryError> {
        let mut inventory = Self::with_capacity(capacity);
        for (slot, item) in items {
            let entry = inventory
                .slots
                .get_mut(slot as usize)
                .ok_or(InventoryError::InvalidSlot(slot))?;
            *entry = Some(item);
        }
        Ok(inventory)
    }

    pub fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn get(&self, slot: u16) -> Option<&Item> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    /// Total units of `item_id` across all slots.
    pub fn count(&self, item_id: u32) -> u32 {
        self.items()
            .filter(|(_, item)| item.item_id == item_id)
            .map(|(_, item)| item.amount as u32)
            .sum()
    }

    /// Non-empty slots in ascending slot order.
    pub fn items(&self) -> impl Iterator<Item = (u16, &Item)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| item.as_ref().map(|item| (slot as u16, item)))
    }

    /// Removes `amount` units from `slot`, returning what was taken.
    pub fn take(&mut self, slot: u16, amount: u16) -> Result<Item, InventoryError> {
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(InventoryError::InvalidSlot(slot))?;
        let item = entry.as_mut().ok_or(InventoryError::EmptySlot(slot))?;
        if amount > item.amount {
            return Err(InventoryError::Insufficient {
                slot,
                owned: item.amount,
                requested: amount,
            });
        }

        let taken = Item {
            amount,
            ..item.clone()
        };
        item.amount -= amount;
        if item.amount == 0 {
            *entry = None;
        }
        Ok(taken)
    }

    /// Stores `item`, merging into a matching stack when the total still fits
    /// in a `u16`, otherwise using the first empty slot.
    pub fn insert(&mut self, item: Item) -> Result<u16, InventoryError> {
        if let Some((slot, existing)) = self.slots.iter_mut().enumerate().find_map(|(i, s)| {
            s.as_mut()
                .filter(|e| e.stacks_with(&item) && e.amount.checked_add(item.amount).is_some())
                .map(|e| (i, e))
        }) {
            existing.amount += item.amount;
            return Ok(slot as u16);
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(InventoryError::Full)?;
        self.slots[slot] = Some(item);
        Ok(slot as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_partial_and_whole_stacks() {
        let mut inventory = Inventory::from_slots(4, [(1, Item::new(500, 3))]).unwrap();

        assert_eq!(inventory.take(1, 2).unwrap(), Item::new(500, 2));
        assert_eq!(inventory.get(1).unwrap().amount, 1);
        inventory.take(1, 1).unwrap();
        assert!(inventory.get(1).is_none());
        assert_eq!(inventory.take(1, 1), Err(InventoryError::EmptySlot(1)));
    }

    #[test]
    fn take_more_than_owned_changes_nothing() {
        let mut inventory = Inventory::from_slots(4, [(0, Item::new(7, 3))]).unwrap();

        assert_eq!(
            inventory.take(0, 5),
            Err(InventoryError::Insufficient {
                slot: 0,
                owned: 3,
                requested: 5
            })
        );
        assert_eq!(inventory.get(0).unwrap().amount, 3);
    }

    #[test]
    fn insert_merges_only_matching_expiry() {
        let mut inventory = Inventory::from_slots(3, [(0, Item::new(7, 1))]).unwrap();

        assert_eq!(inventory.insert(Item::new(7, 4)).unwrap(), 0);
        assert_eq!(inventory.get(0).unwrap().amount, 5);

        assert_eq!(inventory.insert(Item::expiring(7, 1, 99)).unwrap(), 1);
        assert_eq!(inventory.count(7), 6);
    }

    #[test]
    fn insert_into_full_inventory_fails() {
        let mut inventory = Inventory::from_slots(1, [(0, Item::new(1, 1))]).unwrap();
        assert_eq!(inventory.insert(Item::new(2, 1)), Err(InventoryError::Full));
    }

    #[test]
    fn out_of_range_slots_are_rejected() {
        assert_eq!(
            Inventory::from_slots(2, [(5, Item::new(1, 1))]),
            Err(InventoryError::InvalidSlot(5))
        );
        let mut inventory = Inventory::with_capacity(2);
        assert_eq!(inventory.take(9, 1), Err(InventoryError::InvalidSlot(9)));
    }
}
