//! Order registry: live lookup plus terminal-status archive.
//!
//! A single map whose entry is either `Live` (the order's pool slot) or
//! `Terminal` (the archived final status), so an id is in exactly one of
//! the two states by construction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use types::errors::EngineError;
use types::ids::{OrderId, SlotId};
use types::order::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEntry {
    /// Currently allocated order.
    Live(SlotId),
    /// Final status of a completed order.
    Terminal(OrderStatus),
}

#[derive(Debug, Default)]
pub struct OrderRegistry {
    entries: HashMap<OrderId, RegistryEntry>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly allocated order.
    pub fn register(&mut self, id: OrderId, slot: SlotId) -> Result<(), EngineError> {
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(EngineError::DuplicateId),
            Entry::Vacant(vacant) => {
                vacant.insert(RegistryEntry::Live(slot));
                Ok(())
            }
        }
    }

    /// Move an id from live to terminal, recording its final status.
    pub fn finalize(&mut self, id: OrderId, status: OrderStatus) {
        debug_assert!(status.is_terminal());
        self.entries.insert(id, RegistryEntry::Terminal(status));
    }

    pub fn entry(&self, id: OrderId) -> Option<RegistryEntry> {
        self.entries.get(&id).copied()
    }

    /// Pool slot of a live order.
    pub fn live_slot(&self, id: OrderId) -> Option<SlotId> {
        match self.entries.get(&id) {
            Some(RegistryEntry::Live(slot)) => Some(*slot),
            _ => None,
        }
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| matches!(entry, RegistryEntry::Live(_)))
            .count()
    }
}
