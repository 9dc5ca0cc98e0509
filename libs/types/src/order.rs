//! Order lifecycle types.

use crate::ids::{OrderId, SlotId};
use crate::numeric::Price;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buys, -1 for sells; the direction a fill moves a position.
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Order status.
///
/// `Open` orders live in the registry and on exactly one price level.
/// `Filled` and `Canceled` are terminal: the order is gone from the book
/// and only its final status is archived. `NotFound` is the pseudo-status
/// returned by queries for ids the engine has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    NotFound,
}

impl OrderStatus {
    /// Check if the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled)
    }
}

/// An instruction to buy or sell a quantity at a limit price.
///
/// Partial fills decrement `quantity` in place; there is no separate
/// partially-filled state. `slot` names the pool slot holding the record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub price: Price,
    pub quantity: u32,
    pub side: Side,
    pub status: OrderStatus,
    pub slot: SlotId,
}

impl Order {
    /// Create a new open order. The slot is filled in by the pool.
    pub fn new(id: OrderId, price: Price, quantity: u32, side: Side) -> Self {
        Self {
            id,
            price,
            quantity,
            side,
            status: OrderStatus::Open,
            slot: SlotId::new(0, 0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}
