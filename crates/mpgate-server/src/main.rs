//! # mpgate-server
//!
//! Multi-tenant webhook gateway for a messaging platform's official accounts.
//!
//! This binary provides:
//! - **Webhook endpoint** per tenant: signature handshake, optional AES
//!   payload decryption, XML/JSON message decoding
//! - **Auto-replies** resolved from tenant rules (subscribe, keyword,
//!   generic message, menu click), answered inline or pushed via the API
//! - **Access-token management** shared by all gateway instances, with
//!   single-flight refresh
//! - **REST API** (axum) for health checks

mod api;
mod config;
mod config_store;
mod error;
mod gateway;
mod kv;
mod platform;
mod resolver;
mod tenant_cache;
mod token_store;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use mpgate_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::config_store::SqliteConfigStore;
use crate::gateway::ProtocolGateway;
use crate::kv::MemoryKvStore;
use crate::platform::HttpTokenIssuer;
use crate::token_store::CredentialStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mpgate_server=debug")),
        )
        .init();

    info!("Starting mpgate v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let store = Arc::new(SqliteConfigStore::new(db, config.default_tenant.clone()));

    let http = platform::build_http_client(&config)?;
    let kv = MemoryKvStore::new();
    let issuer = Arc::new(HttpTokenIssuer::new(
        http.clone(),
        config.platform_base_url.clone(),
    ));
    let credentials = CredentialStore::new(Arc::new(kv.clone()), issuer);

    let gateway = Arc::new(ProtocolGateway::new(&config, store, credentials, http));
    let app_state = AppState { gateway };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Expired tokens and abandoned refresh locks (every 5 minutes)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            kv.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
