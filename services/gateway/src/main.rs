mod auth;
mod config;
mod error;
mod feed;
mod handlers;
mod models;
mod rate_limit;
mod router;
mod state;

use config::Config;
use router::create_router;
use state::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tracing::info!("starting order book gateway");

    let state = AppState::new(config);
    feed::wire(&state);

    let app = create_router(state.clone());

    let listener = TcpListener::bind(state.config.bind_addr).await?;
    tracing::info!("listening on {}", state.config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
