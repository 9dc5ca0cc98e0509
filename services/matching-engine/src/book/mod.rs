//! Order book infrastructure.
//!
//! Contains the per-price FIFO level and the two side containers.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::{LevelEntry, PriceLevel};
