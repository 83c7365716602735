//! Ledgerline API - finance back office
//!
//! Sales proposals with per-year numbering, and whole-database backup and
//! restore for the accounting tables.

mod backup;
mod config;
mod db;
mod error;
mod models;
mod proposal;
mod routes;
mod state;
mod store;

use crate::config::{Settings, StorageBackend};
use crate::proposal::SequenceAllocator;
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::{MemoryStore, PostgresStore, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the subscriber reads RUST_LOG / LOG_FORMAT
    let _ = dotenvy::dotenv();
    init_tracing();

    info!("🚀 Starting Ledgerline API...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let store: Arc<dyn Store> = match settings.app.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&settings.database).await?;
            db::initialize_schema(&pool).await?;
            Arc::new(PostgresStore::new(pool))
        }
        StorageBackend::Memory => {
            warn!("⚠️  Using the in-memory store, data is lost on shutdown");
            Arc::new(MemoryStore::with_default_currencies().await?)
        }
    };

    let allocator = SequenceAllocator::new(settings.app.proposal_prefix.clone());
    let state = Arc::new(AppState::new(store, allocator));

    // Build the router
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("📚 API Endpoints:");
    info!("   GET    /health");
    info!("   GET    /api/backup/export");
    info!("   POST   /api/backup/import");
    info!("   GET    /api/proposals");
    info!("   POST   /api/proposals");
    info!("   GET    /api/proposals/{{id}}");
    info!("   PUT    /api/proposals/{{id}}");
    info!("   DELETE /api/proposals/{{id}}");
    info!("   GET    /api/proposals/{{id}}/totals");
    info!("   GET    /api/currencies");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerline_api=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
