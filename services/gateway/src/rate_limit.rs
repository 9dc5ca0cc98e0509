//! Per-account rate limiting for PnL queries.
//!
//! Leaky-bucket variant: each account carries a theoretical next-arrival
//! time. A query is admitted while that time has not drifted more than
//! one burst window ahead of the clock, and every admitted query pushes
//! it forward by one refill period, so `burst` queries pass back to back
//! and sustained throughput settles at the configured rate.

use crate::config::Config;
use crate::error::AppError;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use types::ids::AccountId;

/// Refill period used when the configured rate is zero: long enough that
/// an exhausted burst never recovers within a session.
const NEVER: Duration = Duration::from_secs(365 * 24 * 3600);

pub struct PnlRateLimiter {
    /// Time credited per admitted query.
    period: Duration,
    /// How far ahead of the clock an account may run.
    burst_window: Duration,
    schedule: DashMap<AccountId, Instant>,
}

impl PnlRateLimiter {
    pub fn new(config: &Config) -> Self {
        let period = if config.pnl_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / config.pnl_per_second)
        } else {
            NEVER
        };
        Self {
            period,
            burst_window: period * config.pnl_burst.saturating_sub(1),
            schedule: DashMap::new(),
        }
    }

    /// Admit or refuse one PnL query for `account`.
    pub fn check(&self, account: AccountId) -> Result<(), AppError> {
        let now = Instant::now();
        let mut next_arrival = self.schedule.entry(account).or_insert(now);
        let arrival = (*next_arrival).max(now);
        if arrival.duration_since(now) <= self.burst_window {
            *next_arrival = arrival + self.period;
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(format!(
                "pnl queries for {account}"
            )))
        }
    }
}
