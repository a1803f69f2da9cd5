//! Exchange service binary: the `/ws` session protocol server over the
//! `orderbook` matching engine. Replaces the teacher's REST+depth-stream
//! surface with the single framed-command loop of the session protocol.

use exchange_service::config::Config;
use exchange_service::{build_router, AppState};
use orderbook::TradeLog;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let trade_log = TradeLog::open(&config.db_path)?;
    let state = AppState::new(trade_log);
    let app = build_router(state, &config.ws_path);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, path = %config.ws_path, "exchange service listening");

    axum::serve(listener, app).await?;
    Ok(())
}
