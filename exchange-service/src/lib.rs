//! Session/transport layer over the `orderbook` matching engine: request
//! validation, the live-session registry and broadcast, the framed
//! command loop, and runtime configuration. `main` just wires these
//! together behind an axum router; this split also lets integration
//! tests build the router directly instead of shelling out to the binary.

pub mod admission;
pub mod broker;
pub mod config;
pub mod protocol;

use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Json, Router};
use orderbook::{BookManager, TradeLog};

use broker::SessionBroker;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub books: Arc<BookManager>,
    pub trade_log: TradeLog,
    pub broker: SessionBroker,
}

impl AppState {
    pub fn new(trade_log: TradeLog) -> Self {
        Self {
            books: Arc::new(BookManager::new()),
            trade_log,
            broker: SessionBroker::new(),
        }
    }
}

/// Builds the service's axum router: the framed `/ws` command endpoint at
/// `ws_path` plus the `/health` liveness probe.
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(protocol::ws_upgrade))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Plain liveness probe; not named by the session protocol but carried as
/// ambient operational surface, same as the teacher's `/health` route.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "exchange-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
