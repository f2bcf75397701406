//! # tandem-server
//!
//! HTTP API and realtime socket for Tandem direct messaging.
//!
//! This binary provides:
//! - **Accounts** with Argon2 password hashes and JWT bearer tokens
//! - **Friend requests** mirrored into the target's received and the
//!   sender's sent collections
//! - **Direct messages** between friends with per-friend unseen counts
//! - **Presence and push** over a WebSocket (`/ws?token=`)
//! - A periodic **relationship repair pass** for half-written mirrors

mod accounts;
mod api;
mod auth;
mod config;
mod db;
mod error;
mod friends;
mod messaging;
mod realtime;
mod repair;

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tandem_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

const DEFAULT_LOG_FILTER: &str = "info,tandem_server=debug,tandem_store=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(config: &ServerConfig) -> anyhow::Result<db::SharedDb> {
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = database.path() {
        info!(path = %path.display(), "Store ready");
    }
    Ok(db::shared(database))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "Tandem server starting");

    let config = ServerConfig::from_env();
    info!(?config, "Configuration");

    let db = open_store(&config)?;

    // Close any relationship gaps left by a previous run before serving.
    let report = repair::repair_relationships(&db).await?;
    info!(fixes = report.total(), "Startup repair pass done");
    if config.repair_interval_secs > 0 {
        repair::spawn_periodic(db.clone(), Duration::from_secs(config.repair_interval_secs));
    }

    let http_addr = config.http_addr;
    let state = AppState::new(db, config);
    let dispatcher = state.dispatcher.clone();

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, stopping");
        }
    }

    // Drops every socket's queue so the connection tasks wind down.
    dispatcher.shutdown().await;

    Ok(())
}
