//! Matching engine for a single trading instrument.
//!
//! Price-time-priority limit order book with pooled order storage and
//! per-client position accounting.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced
//! - No empty price level survives a match pass
//! - After every operation, best bid < best ask or one side is empty
//! - Event handlers run with no engine lock held

pub mod accounts;
pub mod book;
pub mod engine;
pub mod events;
pub mod pool;
pub mod registry;

pub use accounts::AccountLedger;
pub use engine::MatchingEngine;
