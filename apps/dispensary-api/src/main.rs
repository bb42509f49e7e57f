//! # Dispensary API Server
//!
//! Entry point: configuration, tracing, database, HTTP listener.
//!
//! ```text
//!   load config ──► init tracing ──► open database (migrations)
//!        │
//!        ▼
//!   bind listener ──► serve router ──► ctrl-c / SIGTERM ──► close pool
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use dispensary_api::{router, AppState, DispensaryConfig};
use dispensary_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting dispensary API server...");

    let config = DispensaryConfig::load(None).context("failed to load configuration")?;
    info!(
        bind = %config.server.bind_address(),
        db = %config.database.path.display(),
        max_attempts = config.fulfillment.max_attempts,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("failed to open database")?
        .with_retry_policy(config.retry_policy());
    info!("Database connected and migrations applied");

    let addr = config.server.bind_address();
    let state = Arc::new(AppState { db: db.clone() });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber from `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dispensary=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
