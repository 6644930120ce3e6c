//! PG Billing Core - API Server Binary
//!
//! Starts the HTTP API and the background billing scheduler.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin pg-billing-api
//!
//! # Run with environment variables
//! API_PORT=9000 API_DATABASE_URL=postgres://... cargo run --bin pg-billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DB_MAX_CONNECTIONS` / `API_DB_MIN_CONNECTIONS` - Pool bounds
//! * `API_LOG_LEVEL` - Log level or filter directive (default: info)
//! * `API_LOG_FORMAT` - `text` or `json` (default: text)
//! * `API_TIMEZONE` - Business timezone (default: Asia/Kolkata)
//! * `API_SCHEDULER_ENABLED` - Run the billing jobs (default: true)
//! * `API_GENERATE_CRON` / `API_OVERDUE_CRON` - Job schedules, with seconds

use std::net::SocketAddr;

use anyhow::Context;
use infra_db::{create_pool, DatabaseConfig};
use interface_api::config::{ApiConfig, LogFormat};
use interface_api::scheduler::Scheduler;
use interface_api::{create_router, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, connects to the database
/// (applying migrations), starts the scheduler and serves HTTP until a
/// shutdown signal arrives.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("Failed to load API configuration")?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        timezone = %config.timezone,
        "Starting PG Billing Core API Server"
    );

    let db_config = DatabaseConfig::new(config.database_url.clone())
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .with_migrations(true);
    let pool = create_pool(db_config)
        .await
        .context("Failed to connect to the database")?;

    let state = AppState::postgres(pool, config.clone()).context("Invalid business timezone")?;

    let scheduler = if config.scheduler_enabled {
        let scheduler = Scheduler::from_config(state.billing.clone(), &config)
            .context("Invalid scheduler configuration")?;
        Some(scheduler.spawn())
    } else {
        tracing::info!("Billing scheduler disabled");
        None
    };

    let app = create_router(state);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_addr()))?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
