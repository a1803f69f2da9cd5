//! Runtime configuration loaded from the environment, optionally via a
//! `.env` file. The core names no CLI flags (spec §6); everything here
//! is an override of a sensible default.

use std::net::SocketAddr;

use anyhow::Context;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub ws_path: String,
    pub db_path: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, continuing with process environment only");
        }

        let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .with_context(|| format!("invalid LISTEN_ADDR {listen_addr:?}"))?;

        let ws_path = std::env::var("WS_PATH").unwrap_or_else(|_| "/ws".to_string());
        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "data.db".to_string());

        Ok(Self { listen_addr, ws_path, db_path })
    }
}
