//! Metadata store abstraction and implementations for Registrar.
//!
//! This crate provides the persistence boundary of the lifecycle core:
//! - Lifecycle-managed record rows and their transitions
//! - Tombstones reserving purged identifiers
//! - Purge-candidate queries for cleanup sweeps
//! - Consistent lifecycle statistics

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use registrar_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("Connecting to PostgreSQL metadata store");
            let store =
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
