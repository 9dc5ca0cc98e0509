//! Error taxonomy for the matching engine.
//!
//! Every engine operation reports failure synchronously through these
//! variants; the engine never logs and never unwinds across a callback
//! boundary.

use thiserror::Error;

/// Engine operation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Non-positive price or zero quantity; nothing was allocated.
    #[error("invalid price or quantity")]
    InvalidInput,

    /// The registry already holds this id. Cannot occur under normal id
    /// generation; kept as a guard.
    #[error("order id already registered")]
    DuplicateId,

    /// The allocator had no free slot even after one growth attempt.
    #[error("order pool exhausted")]
    PoolExhausted,

    /// The id names no live order.
    #[error("order not found")]
    NotFound,

    /// The order exists but is no longer open.
    #[error("order is not cancelable")]
    NotCancelable,

    /// The order exists but is no longer open.
    #[error("order is not modifiable")]
    NotModifiable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(EngineError::InvalidInput.to_string(), "invalid price or quantity");
        assert_eq!(EngineError::PoolExhausted.to_string(), "order pool exhausted");
    }
}
