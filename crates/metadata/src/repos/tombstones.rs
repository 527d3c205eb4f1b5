//! Tombstone repository: permanent reservation of purged identifiers.

use crate::error::MetadataResult;
use crate::models::TombstoneRow;
use async_trait::async_trait;
use registrar_core::EntityKind;
use uuid::Uuid;

/// Repository for tombstone lookups.
#[async_trait]
pub trait TombstoneRepo: Send + Sync {
    /// Get a tombstone by the purged record's unique id.
    async fn get_tombstone(&self, unique_id: &str) -> MetadataResult<Option<TombstoneRow>>;

    /// Check whether a record was purged.
    async fn is_tombstoned(&self, kind: EntityKind, record_id: Uuid) -> MetadataResult<bool>;

    /// Most recently purged tombstones, newest first.
    async fn list_tombstones(&self, limit: u32) -> MetadataResult<Vec<TombstoneRow>>;
}
