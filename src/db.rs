//! Database connection management
//!
//! Builds the connection pool (TLS for hosted databases) and applies the
//! schema at startup.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::store::StoreError;
use deadpool_postgres::{Config, CreatePoolError, ManagerConfig, Pool, RecyclingMethod, Runtime};
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to create pool: {0}")]
    CreatePool(#[from] CreatePoolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        DbError::Store(e.into())
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        DbError::Store(e.into())
    }
}

/// Create the pool and check that a connection can be made
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool, DbError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_pool_size));

    let pool = if config.use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)?
    };

    // Fail fast on bad credentials instead of on the first request
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;

    info!(
        "Database pool ready: {}@{}:{}/{} (TLS: {}, max {} connections)",
        config.user, config.host, config.port, config.database, config.use_tls, config.max_pool_size
    );
    Ok(pool)
}

/// Create missing tables and seed the default currencies
pub async fn initialize_schema(pool: &Pool) -> Result<(), DbError> {
    let client = pool.get().await?;

    for statement in queries::SCHEMA {
        client.batch_execute(statement).await?;
    }
    let seeded = client.execute(queries::SEED_CURRENCIES, &[]).await?;
    debug!("Seeded {} default currencies", seeded);

    info!("Database schema initialized ({} statements)", queries::SCHEMA.len());
    Ok(())
}
