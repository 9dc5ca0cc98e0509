//! Engine-to-gateway event bridge.
//!
//! `on_trade` updates the account ledger and fans the trade out to every
//! subscribed session. `on_book_change` only marks the book dirty; a
//! background task broadcasts the coalesced snapshot at a minimum
//! interval, so a burst of mutations costs one broadcast and the final
//! post-quiescence state is always sent.

use crate::models::{OrderView, ServerMessage};
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use types::trade::Trade;

/// Register engine handlers and spawn the book broadcast task.
pub fn wire(state: &AppState) {
    let ledger = state.ledger.clone();
    let trade_tx = state.events.clone();
    state.engine.set_on_trade(Some(Arc::new(move |trade: &Trade| {
        ledger.on_trade(trade);
        let _ = trade_tx.send(ServerMessage::TradeEvent { trade: *trade });
    })));

    let dirty = Arc::new(AtomicBool::new(false));
    let flag = dirty.clone();
    state
        .engine
        .set_on_book_change(Some(Arc::new(move || flag.store(true, Ordering::Release))));

    let engine = state.engine.clone();
    let book_tx = state.events.clone();
    let interval = state.config.book_broadcast_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if dirty.swap(false, Ordering::AcqRel) {
                let (bids, asks) = engine.snapshot();
                let _ = book_tx.send(ServerMessage::BookUpdate {
                    bids: bids.into_iter().map(OrderView::from).collect(),
                    asks: asks.into_iter().map(OrderView::from).collect(),
                });
            }
        }
    });
}
