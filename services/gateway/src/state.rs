//! Shared application state.

use crate::auth::Authenticator;
use crate::config::Config;
use crate::models::ServerMessage;
use crate::rate_limit::PnlRateLimiter;
use matching_engine::{AccountLedger, MatchingEngine};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub ledger: Arc<AccountLedger>,
    pub auth: Arc<Authenticator>,
    pub pnl_limiter: Arc<PnlRateLimiter>,
    /// Fan-out channel for trade events and coalesced book updates.
    pub events: broadcast::Sender<ServerMessage>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            engine: Arc::new(MatchingEngine::new()),
            ledger: Arc::new(AccountLedger::new()),
            auth: Arc::new(Authenticator::new(&config.jwt_secret)),
            pnl_limiter: Arc::new(PnlRateLimiter::new(&config)),
            events,
            config: Arc::new(config),
        }
    }
}
