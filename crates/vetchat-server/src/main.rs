//! # vetchat-server
//!
//! Reference conversation store for the vetchat clients.
//!
//! This binary provides:
//! - **REST API** (axum) speaking the store protocol: conversations keyed by
//!   participant pair, message append, batched seen-flag patches, and the
//!   owner/vet directory
//! - **Admin routes** for maintaining profiles and the block flag
//! - **Per-IP rate limiting** sized for polling clients

mod api;
mod config;
mod error;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use vetchat_store::{Database, SqliteStore};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vetchat_server=debug,vetchat_store=info")),
        )
        .init();

    info!("Starting vetchat store server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.http_addr,
        admin_enabled = config.admin_token.is_some(),
        rate = config.rate_limit_per_sec,
        burst = config.rate_limit_burst,
        "Loaded configuration"
    );

    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let store = Arc::new(SqliteStore::new(db));

    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);

    // Every 5 minutes, forget clients idle for more than 10.
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = rl.purge_idle(Duration::from_secs(600)).await;
            if purged > 0 {
                tracing::debug!(purged, "Evicted idle rate-limit buckets");
            }
        }
    });

    let http_addr = config.http_addr;
    let app_state = AppState {
        store,
        rate_limiter,
        config: Arc::new(config),
    };

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
