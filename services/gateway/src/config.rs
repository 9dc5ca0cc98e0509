//! Gateway configuration from environment variables, with defaults that
//! run out of the box.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Socket the gateway listens on.
    pub bind_addr: SocketAddr,
    /// HS256 secret used to validate session tokens.
    pub jwt_secret: String,
    /// Minimum interval between coalesced book broadcasts.
    pub book_broadcast_interval: Duration,
    /// PnL query burst size per account.
    pub pnl_burst: u32,
    /// PnL query refill rate per account, tokens per second.
    pub pnl_per_second: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_parse("GATEWAY_ADDR", SocketAddr::from(([0, 0, 0, 0], 9001))),
            jwt_secret: env::var("GATEWAY_JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            book_broadcast_interval: Duration::from_millis(env_parse(
                "GATEWAY_BOOK_INTERVAL_MS",
                100u64,
            )),
            pnl_burst: env_parse("GATEWAY_PNL_BURST", 10u32),
            pnl_per_second: env_parse("GATEWAY_PNL_PER_SECOND", 5.0f64),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
