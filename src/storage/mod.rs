pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Open the configured backend and log the outcome.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Result<Arc<dyn Storage>> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            SqliteStorage::new(&config.url, config.max_connections)
                .await
                .map(|s| Arc::new(s) as Arc<dyn Storage>)
        }
        DatabaseBackend::Postgres => match config.credentials {
            Some(ref credentials) => {
                info!(
                    "Using PostgreSQL storage: {}@{}/{}",
                    credentials.user, credentials.host, credentials.database
                );
                PostgresStorage::with_credentials(credentials, config.max_connections)
                    .await
                    .map(|s| Arc::new(s) as Arc<dyn Storage>)
            }
            None => {
                info!("Using PostgreSQL storage (DATABASE_URL)");
                PostgresStorage::new(&config.url, config.max_connections)
                    .await
                    .map(|s| Arc::new(s) as Arc<dyn Storage>)
            }
        },
    };

    match storage {
        Ok(storage) => {
            info!("Connected to database");
            Ok(storage)
        }
        Err(e) => {
            error!("Error connecting to database: {:#}", e);
            Err(e)
        }
    }
}
