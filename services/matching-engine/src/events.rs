//! Event dispatch for trade and book-change notifications.
//!
//! Two subscription slots, each holding at most one handler. Handlers are
//! cloned out of their slot before invocation so no engine lock (including
//! the slot lock itself) is held while a handler runs; handlers may call
//! back into the engine's read and write APIs.

use parking_lot::RwLock;
use std::sync::Arc;
use types::trade::Trade;

/// Invoked once per trade, in match-pass order, after engine locks are
/// released.
pub type TradeHandler = Arc<dyn Fn(&Trade) + Send + Sync>;

/// Invoked at most once per command that mutated the book.
pub type BookChangeHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct HandlerSlots {
    on_trade: RwLock<Option<TradeHandler>>,
    on_book_change: RwLock<Option<BookChangeHandler>>,
}

impl HandlerSlots {
    pub fn set_on_trade(&self, handler: Option<TradeHandler>) {
        *self.on_trade.write() = handler;
    }

    pub fn set_on_book_change(&self, handler: Option<BookChangeHandler>) {
        *self.on_book_change.write() = handler;
    }

    pub fn trade_handler(&self) -> Option<TradeHandler> {
        self.on_trade.read().clone()
    }

    pub fn book_change_handler(&self) -> Option<BookChangeHandler> {
        self.on_book_change.read().clone()
    }
}
