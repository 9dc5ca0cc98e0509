//! Matching engine core.
//!
//! Orchestrates the order pool, the two book sides, the registry and the
//! trade history behind a concurrent command API. Lock order is
//! bids → asks → registry → history, with the pool's own lock innermost;
//! event handlers always run after every engine lock is released.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use types::errors::EngineError;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::{Order, OrderStatus, Side};
use types::trade::Trade;

use crate::book::{AskBook, BidBook};
use crate::events::{BookChangeHandler, HandlerSlots, TradeHandler};
use crate::pool::OrderPool;
use crate::registry::{OrderRegistry, RegistryEntry};

/// Price-time-priority order book and matcher for one instrument.
pub struct MatchingEngine {
    bids: RwLock<BidBook>,
    asks: RwLock<AskBook>,
    registry: RwLock<OrderRegistry>,
    history: RwLock<Vec<Trade>>,
    pool: OrderPool,
    next_order_id: AtomicU64,
    handlers: HandlerSlots,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            bids: RwLock::new(BidBook::new()),
            asks: RwLock::new(AskBook::new()),
            registry: RwLock::new(OrderRegistry::new()),
            history: RwLock::new(Vec::new()),
            pool: OrderPool::new(),
            next_order_id: AtomicU64::new(1),
            handlers: HandlerSlots::default(),
        }
    }

    /// Submit a new limit order.
    ///
    /// Validates inputs, rests the order at the tail of its price level
    /// and runs a match pass. Remaining quantity and terminal status are
    /// observable through [`status`](Self::status) as soon as this
    /// returns.
    pub fn submit(&self, price: Decimal, quantity: u32, side: Side) -> Result<OrderId, EngineError> {
        let price = Price::try_new(price).ok_or(EngineError::InvalidInput)?;
        if quantity == 0 {
            return Err(EngineError::InvalidInput);
        }

        let id = OrderId::new(self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let order = Order::new(id, price, quantity, side);
        let slot = self.pool.allocate(order)?;
        if let Err(e) = self.registry.write().register(id, slot) {
            self.pool.free(slot);
            return Err(e);
        }

        match side {
            Side::Buy => self.bids.write().insert(price, id, slot),
            Side::Sell => self.asks.write().insert(price, id, slot),
        }

        let trades = self.run_match_pass();
        self.emit_trades(&trades);
        self.emit_book_change();
        Ok(id)
    }

    /// Cancel an open order.
    ///
    /// Removal from the book under the side write lock is the
    /// linearization point: an order the matcher has already taken off
    /// the book is reported `NotCancelable`.
    pub fn cancel(&self, id: OrderId) -> Result<(), EngineError> {
        let (slot, side) = {
            let registry = self.registry.read();
            match registry.entry(id) {
                None => return Err(EngineError::NotFound),
                Some(RegistryEntry::Terminal(_)) => return Err(EngineError::NotCancelable),
                Some(RegistryEntry::Live(slot)) => {
                    let order = self
                        .pool
                        .get(slot)
                        .filter(|o| o.id == id)
                        .ok_or(EngineError::NotCancelable)?;
                    (slot, order.side)
                }
            }
        };

        let removed = match side {
            Side::Buy => {
                let mut bids = self.bids.write();
                match self.pool.get(slot).filter(|o| o.id == id) {
                    Some(current) => bids.remove(id, current.price),
                    None => false,
                }
            }
            Side::Sell => {
                let mut asks = self.asks.write();
                match self.pool.get(slot).filter(|o| o.id == id) {
                    Some(current) => asks.remove(id, current.price),
                    None => false,
                }
            }
        };
        if !removed {
            return Err(EngineError::NotCancelable);
        }

        self.pool.with_mut(slot, |o| o.status = OrderStatus::Canceled);
        self.registry.write().finalize(id, OrderStatus::Canceled);
        self.pool.free(slot);
        self.emit_book_change();
        Ok(())
    }

    /// Replace an open order's price and quantity.
    ///
    /// Semantically cancel + resubmit with the same id: the order is
    /// re-inserted at the tail of its new level and loses time priority,
    /// then a match pass runs.
    pub fn modify(
        &self,
        id: OrderId,
        new_price: Decimal,
        new_quantity: u32,
    ) -> Result<(), EngineError> {
        let new_price = Price::try_new(new_price).ok_or(EngineError::InvalidInput)?;
        if new_quantity == 0 {
            return Err(EngineError::InvalidInput);
        }

        let (slot, side) = {
            let registry = self.registry.read();
            match registry.entry(id) {
                None => return Err(EngineError::NotFound),
                Some(RegistryEntry::Terminal(_)) => return Err(EngineError::NotModifiable),
                Some(RegistryEntry::Live(slot)) => {
                    let order = self
                        .pool
                        .get(slot)
                        .filter(|o| o.id == id)
                        .ok_or(EngineError::NotModifiable)?;
                    (slot, order.side)
                }
            }
        };

        match side {
            Side::Buy => {
                let mut bids = self.bids.write();
                let current = self
                    .pool
                    .get(slot)
                    .filter(|o| o.id == id && o.is_open())
                    .ok_or(EngineError::NotModifiable)?;
                if !bids.remove(id, current.price) {
                    return Err(EngineError::NotModifiable);
                }
                self.pool.with_mut(slot, |o| {
                    o.price = new_price;
                    o.quantity = new_quantity;
                });
                bids.insert(new_price, id, slot);
            }
            Side::Sell => {
                let mut asks = self.asks.write();
                let current = self
                    .pool
                    .get(slot)
                    .filter(|o| o.id == id && o.is_open())
                    .ok_or(EngineError::NotModifiable)?;
                if !asks.remove(id, current.price) {
                    return Err(EngineError::NotModifiable);
                }
                self.pool.with_mut(slot, |o| {
                    o.price = new_price;
                    o.quantity = new_quantity;
                });
                asks.insert(new_price, id, slot);
            }
        }

        let trades = self.run_match_pass();
        self.emit_trades(&trades);
        self.emit_book_change();
        Ok(())
    }

    /// Current status of an order: live, archived, or `NotFound`.
    pub fn status(&self, id: OrderId) -> OrderStatus {
        let registry = self.registry.read();
        match registry.entry(id) {
            Some(RegistryEntry::Live(slot)) => self
                .pool
                .get(slot)
                .filter(|o| o.id == id)
                .map(|o| o.status)
                .unwrap_or(OrderStatus::NotFound),
            Some(RegistryEntry::Terminal(status)) => status,
            None => OrderStatus::NotFound,
        }
    }

    /// Copy of a live order.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        let registry = self.registry.read();
        let slot = registry.live_slot(id)?;
        self.pool.get(slot).filter(|o| o.id == id)
    }

    /// Open orders per side, best price first, FIFO within a level.
    ///
    /// Each side is individually consistent; the two sides may be
    /// observed a moment apart.
    pub fn snapshot(&self) -> (Vec<Order>, Vec<Order>) {
        let bid_snapshot = {
            let bids = self.bids.read();
            bids.iter_best_first()
                .filter_map(|entry| self.pool.get(entry.slot).filter(|o| o.id == entry.id))
                .collect()
        };
        let ask_snapshot = {
            let asks = self.asks.read();
            asks.iter_best_first()
                .filter_map(|entry| self.pool.get(entry.slot).filter(|o| o.id == entry.id))
                .collect()
        };
        (bid_snapshot, ask_snapshot)
    }

    /// Snapshot copy of the trade history.
    pub fn trade_history(&self) -> Vec<Trade> {
        self.history.read().clone()
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.bids.read().best_price()
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.asks.read().best_price()
    }

    /// Reference price for unrealized PnL: last trade, else mid of best
    /// bid/ask, else whichever side is present.
    pub fn mark_price(&self) -> Option<Price> {
        let last = self.history.read().last().copied();
        if let Some(trade) = last {
            return Some(trade.price);
        }
        match (self.best_bid_price(), self.best_ask_price()) {
            (Some(bid), Some(ask)) => Some(bid.mid(ask)),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        }
    }

    pub fn set_on_trade(&self, handler: Option<TradeHandler>) {
        self.handlers.set_on_trade(handler);
    }

    pub fn set_on_book_change(&self, handler: Option<BookChangeHandler>) {
        self.handlers.set_on_book_change(handler);
    }

    /// Cross the book until best bid < best ask or a side empties.
    ///
    /// Holds both side write locks for the whole pass; produced trades
    /// are buffered and returned so the caller can emit them after the
    /// locks are gone.
    fn run_match_pass(&self) -> Vec<Trade> {
        let timestamp = unix_timestamp();
        let mut bids = self.bids.write();
        let mut asks = self.asks.write();
        let mut fired = Vec::new();

        loop {
            let (Some(bid_price), Some(ask_price)) = (bids.best_price(), asks.best_price())
            else {
                break;
            };
            if bid_price < ask_price {
                break;
            }

            // Levels are erased the moment they empty, so a drained best
            // level here means tombstones only; cull it and retry.
            let buy_probe = match bids.best_level_mut() {
                Some((price, level)) => (price, level.front()),
                None => break,
            };
            let buy_entry = match buy_probe {
                (_, Some(entry)) => entry,
                (price, None) => {
                    bids.erase_level(price);
                    continue;
                }
            };
            let sell_probe = match asks.best_level_mut() {
                Some((price, level)) => (price, level.front()),
                None => break,
            };
            let sell_entry = match sell_probe {
                (_, Some(entry)) => entry,
                (price, None) => {
                    asks.erase_level(price);
                    continue;
                }
            };

            let buy = self
                .pool
                .get(buy_entry.slot)
                .expect("level entry is backed by a live pool slot");
            let sell = self
                .pool
                .get(sell_entry.slot)
                .expect("level entry is backed by a live pool slot");

            let qty = buy.quantity.min(sell.quantity);
            let trade = Trade::new(buy.id, sell.id, sell.price, qty, timestamp);
            self.history.write().push(trade);
            fired.push(trade);

            let buy_left = self
                .pool
                .with_mut(buy_entry.slot, |o| {
                    o.quantity -= qty;
                    o.quantity
                })
                .unwrap_or(0);
            let sell_left = self
                .pool
                .with_mut(sell_entry.slot, |o| {
                    o.quantity -= qty;
                    o.quantity
                })
                .unwrap_or(0);

            if buy_left == 0 {
                self.pool
                    .with_mut(buy_entry.slot, |o| o.status = OrderStatus::Filled);
                let emptied = match bids.best_level_mut() {
                    Some((price, level)) => {
                        level.pop_front();
                        level.is_empty().then_some(price)
                    }
                    None => None,
                };
                if let Some(price) = emptied {
                    bids.erase_level(price);
                }
                self.registry.write().finalize(buy.id, OrderStatus::Filled);
                self.pool.free(buy_entry.slot);
            }
            if sell_left == 0 {
                self.pool
                    .with_mut(sell_entry.slot, |o| o.status = OrderStatus::Filled);
                let emptied = match asks.best_level_mut() {
                    Some((price, level)) => {
                        level.pop_front();
                        level.is_empty().then_some(price)
                    }
                    None => None,
                };
                if let Some(price) = emptied {
                    asks.erase_level(price);
                }
                self.registry.write().finalize(sell.id, OrderStatus::Filled);
                self.pool.free(sell_entry.slot);
            }
        }

        fired
    }

    fn emit_trades(&self, trades: &[Trade]) {
        if trades.is_empty() {
            return;
        }
        if let Some(handler) = self.handlers.trade_handler() {
            for trade in trades {
                handler(trade);
            }
        }
    }

    fn emit_book_change(&self) {
        if let Some(handler) = self.handlers.book_change_handler() {
            handler();
        }
    }

    #[cfg(test)]
    pub(crate) fn pool_live_count(&self) -> usize {
        self.pool.live_count()
    }

    #[cfg(test)]
    pub(crate) fn registry_live_count(&self) -> usize {
        self.registry.read().live_count()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn px(value: u64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn test_submit_validates_input() {
        let engine = MatchingEngine::new();
        assert_eq!(
            engine.submit(Decimal::ZERO, 5, Side::Buy),
            Err(EngineError::InvalidInput)
        );
        assert_eq!(
            engine.submit(px(100), 0, Side::Buy),
            Err(EngineError::InvalidInput)
        );
    }

    #[test]
    fn test_submit_assigns_monotonic_ids() {
        let engine = MatchingEngine::new();
        let first = engine.submit(px(100), 5, Side::Buy).unwrap();
        let second = engine.submit(px(101), 5, Side::Buy).unwrap();
        assert_eq!(first.as_u64(), 1);
        assert_eq!(second.as_u64(), 2);
    }

    #[test]
    fn test_resting_order_is_open() {
        let engine = MatchingEngine::new();
        let id = engine.submit(px(100), 5, Side::Buy).unwrap();
        assert_eq!(engine.status(id), OrderStatus::Open);
        assert_eq!(engine.best_bid_price(), Some(Price::from_u64(100)));
    }

    #[test]
    fn test_full_cross_fills_both() {
        let engine = MatchingEngine::new();
        let buy = engine.submit(px(100), 5, Side::Buy).unwrap();
        let sell = engine.submit(px(100), 5, Side::Sell).unwrap();

        assert_eq!(engine.status(buy), OrderStatus::Filled);
        assert_eq!(engine.status(sell), OrderStatus::Filled);

        let history = engine.trade_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, Price::from_u64(100));
        assert_eq!(history[0].quantity, 5);

        let (bids, asks) = engine.snapshot();
        assert!(bids.is_empty());
        assert!(asks.is_empty());
        assert_eq!(engine.pool_live_count(), 0);
    }

    #[test]
    fn test_partial_fill_stays_open() {
        let engine = MatchingEngine::new();
        let buy = engine.submit(px(100), 10, Side::Buy).unwrap();
        let sell = engine.submit(px(100), 4, Side::Sell).unwrap();

        assert_eq!(engine.status(sell), OrderStatus::Filled);
        assert_eq!(engine.status(buy), OrderStatus::Open);
        assert_eq!(engine.order(buy).unwrap().quantity, 6);
    }

    #[test]
    fn test_cancel_round_trip() {
        let engine = MatchingEngine::new();
        let id = engine.submit(px(100), 5, Side::Buy).unwrap();
        engine.cancel(id).unwrap();

        assert_eq!(engine.status(id), OrderStatus::Canceled);
        assert_eq!(engine.cancel(id), Err(EngineError::NotCancelable));
        assert_eq!(engine.pool_live_count(), 0);
        assert_eq!(engine.registry_live_count(), 0);
    }

    #[test]
    fn test_cancel_unknown_id() {
        let engine = MatchingEngine::new();
        assert_eq!(engine.cancel(OrderId::new(99)), Err(EngineError::NotFound));
    }

    #[test]
    fn test_modify_preserves_id_and_triggers_match() {
        let engine = MatchingEngine::new();
        let sell = engine.submit(px(105), 5, Side::Sell).unwrap();
        let buy = engine.submit(px(100), 5, Side::Buy).unwrap();
        assert!(engine.trade_history().is_empty());

        engine.modify(buy, px(105), 5).unwrap();

        assert_eq!(engine.status(buy), OrderStatus::Filled);
        assert_eq!(engine.status(sell), OrderStatus::Filled);
        let history = engine.trade_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].buy_order_id, buy);
        assert_eq!(history[0].price, Price::from_u64(105));
    }

    #[test]
    fn test_modify_rejects_filled_order() {
        let engine = MatchingEngine::new();
        let buy = engine.submit(px(100), 5, Side::Buy).unwrap();
        engine.submit(px(100), 5, Side::Sell).unwrap();

        assert_eq!(
            engine.modify(buy, px(101), 5),
            Err(EngineError::NotModifiable)
        );
    }

    #[test]
    fn test_modify_validates_input() {
        let engine = MatchingEngine::new();
        let id = engine.submit(px(100), 5, Side::Buy).unwrap();
        assert_eq!(
            engine.modify(id, Decimal::ZERO, 5),
            Err(EngineError::InvalidInput)
        );
        assert_eq!(engine.modify(id, px(100), 0), Err(EngineError::InvalidInput));
        assert_eq!(engine.status(id), OrderStatus::Open);
    }

    #[test]
    fn test_no_cross_leaves_spread() {
        let engine = MatchingEngine::new();
        engine.submit(px(99), 5, Side::Buy).unwrap();
        engine.submit(px(101), 5, Side::Sell).unwrap();

        assert!(engine.trade_history().is_empty());
        assert_eq!(engine.best_bid_price(), Some(Price::from_u64(99)));
        assert_eq!(engine.best_ask_price(), Some(Price::from_u64(101)));
    }

    #[test]
    fn test_mark_price_fallbacks() {
        let engine = MatchingEngine::new();
        assert_eq!(engine.mark_price(), None);

        engine.submit(px(99), 5, Side::Buy).unwrap();
        assert_eq!(engine.mark_price(), Some(Price::from_u64(99)));

        engine.submit(px(101), 5, Side::Sell).unwrap();
        assert_eq!(engine.mark_price(), Some(Price::from_u64(100)));

        engine.submit(px(101), 5, Side::Buy).unwrap();
        // last trade dominates once one exists
        assert_eq!(engine.mark_price(), Some(Price::from_u64(101)));
    }

    #[test]
    fn test_trade_events_fire_after_locks_released() {
        // The handler reads the book back; it would deadlock if any
        // engine lock were still held when it runs.
        let engine = Arc::new(MatchingEngine::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let engine_ref = engine.clone();
        let seen_ref = seen.clone();
        engine.set_on_trade(Some(Arc::new(move |trade: &Trade| {
            let (bids, asks) = engine_ref.snapshot();
            seen_ref.lock().push((*trade, bids.len(), asks.len()));
        })));

        engine.submit(px(100), 5, Side::Buy).unwrap();
        engine.submit(px(100), 5, Side::Sell).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, 0);
        assert_eq!(seen[0].2, 0);
    }

    #[test]
    fn test_book_change_fires_per_mutating_command() {
        let engine = MatchingEngine::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        engine.set_on_book_change(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        let id = engine.submit(px(100), 5, Side::Buy).unwrap();
        engine.modify(id, px(101), 5).unwrap();
        engine.cancel(id).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
