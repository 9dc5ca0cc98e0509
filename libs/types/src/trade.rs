//! Trade records.

use crate::ids::OrderId;
use crate::numeric::Price;
use serde::{Deserialize, Serialize};

/// Record of a crossing between one buy and one sell order.
///
/// Immutable once appended to the history. The price is the ask-head
/// price at match time; the timestamp is wall-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub price: Price,
    pub quantity: u32,
    pub timestamp: u64,
}

impl Trade {
    pub fn new(
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        price: Price,
        quantity: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            buy_order_id,
            sell_order_id,
            price,
            quantity,
            timestamp,
        }
    }
}
