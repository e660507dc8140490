//! ledger-gateway server entry point.
//!
//! Starts the Axum HTTP server over the PostgreSQL ledger store, or over
//! the in-memory store when persistence is disabled.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ledger_gateway::api;
use ledger_gateway::app_state::AppState;
use ledger_gateway::config::{LedgerConfig, LogFormat};
use ledger_gateway::persistence::{InMemoryStore, LedgerStore, PostgresStore};
use ledger_gateway::service::LedgerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = LedgerConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting ledger-gateway");

    // Build persistence layer
    let store: Arc<dyn LedgerStore> = match &config.database {
        Some(database) => {
            let store = PostgresStore::connect(database)
                .await
                .context("failed to connect to PostgreSQL")?;
            if config.run_migrations {
                store
                    .run_migrations()
                    .await
                    .context("failed to apply ledger schema")?;
            }
            Arc::new(store)
        }
        None => {
            tracing::warn!("persistence disabled, ledger state lives in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    // Build service layer
    let ledger_service = Arc::new(LedgerService::new(store, config.retry_policy()));

    // Build application state
    let app_state = AppState {
        ledger_service,
        request_timeout: config.request_timeout(),
    };

    // The handler deadline fires first so clients get a structured 504.
    let hard_timeout = config.http_timeout();

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(hard_timeout)),
        )
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
