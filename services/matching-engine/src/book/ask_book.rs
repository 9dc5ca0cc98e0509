//! Ask (sell-side) order book.
//!
//! Price levels sorted so the lowest ask is best, which is BTreeMap's
//! natural first entry.

use std::collections::BTreeMap;
use types::ids::{OrderId, SlotId};
use types::numeric::Price;

use super::price_level::{LevelEntry, PriceLevel};

#[derive(Debug, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order at the tail of its price level.
    pub fn insert(&mut self, price: Price, id: OrderId, slot: SlotId) {
        self.levels.entry(price).or_default().insert(id, slot);
    }

    /// Remove an order; erases the level if it empties.
    ///
    /// Returns true if the order was found and removed.
    pub fn remove(&mut self, id: OrderId, price: Price) -> bool {
        if let Some(level) = self.levels.get_mut(&price) {
            if level.remove(id) {
                if level.is_empty() {
                    self.levels.remove(&price);
                }
                return true;
            }
        }
        false
    }

    /// Lowest resting ask price.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Mutable access to the best level.
    pub fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next()
            .map(|(price, level)| (*price, level))
    }

    pub fn erase_level(&mut self, price: Price) {
        self.levels.remove(&price);
    }

    /// Live orders, best price first, FIFO within a level.
    pub fn iter_best_first(&self) -> impl Iterator<Item = &LevelEntry> {
        self.levels.values().flat_map(|level| level.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
