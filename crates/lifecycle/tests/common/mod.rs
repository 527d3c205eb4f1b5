//! Common test utilities and fixtures.

pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mocks::*;

use registrar_core::config::{LoggingConfig, RetentionConfig};
use registrar_lifecycle::LifecycleService;
use std::sync::Arc;
use tempfile::TempDir;

/// A lifecycle service over an instrumented SQLite store.
pub struct TestHarness {
    pub store: Arc<mocks::InstrumentedStore>,
    pub service: Arc<LifecycleService>,
    _temp_dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_retention(RetentionConfig::default()).await
    }

    pub async fn with_retention(config: RetentionConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(
            mocks::InstrumentedStore::new(&db_path)
                .await
                .expect("Failed to create store"),
        );
        let service = Arc::new(LifecycleService::new(
            store.clone(),
            config,
            &LoggingConfig { verbose: true },
        ));
        Self {
            store,
            service,
            _temp_dir: temp_dir,
        }
    }
}
