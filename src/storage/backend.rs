//! Startup-time backend selection.
//!
//! The decision is taken once, before the HTTP server starts; requests never branch on it.

use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::configuration::types::StorageConfig;
use crate::error_handling::types::StorageError;
use crate::storage::postgres_storage::PostgresStorage;
use crate::storage::sqlite_storage::SqliteStorage;
use crate::storage::storage_trait::Storage;

/// Connects the configured backend, falling back from PostgreSQL to SQLite when allowed.
///
/// Returns `StorageError::ConnectionFailed` when no backend can be opened.
pub async fn connect_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    if config.use_sqlite {
        info!("SQLite backend forced by configuration");
        return open_sqlite(&config.sqlite_path).await;
    }

    let url = match config.postgres_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url,
        _ => {
            info!("No PostgreSQL connection string configured");
            return open_sqlite(&config.sqlite_path).await;
        }
    };

    match PostgresStorage::connect(url).await {
        Ok(storage) => Ok(Arc::new(storage)),
        Err(e) if config.no_fallback => {
            error!("PostgreSQL not available and fallback is disabled: {}", e);
            Err(e)
        }
        Err(e) => {
            warn!("PostgreSQL not available ({}), falling back to SQLite", e);
            open_sqlite(&config.sqlite_path).await
        }
    }
}

async fn open_sqlite(path: &Path) -> Result<Arc<dyn Storage>, StorageError> {
    info!("Opening SQLite database at {}", path.display());
    let storage = SqliteStorage::open(path).await?;
    Ok(Arc::new(storage))
}
