//! Sweep repository: purge-eligibility queries and the purge transition.

use crate::error::MetadataResult;
use crate::models::RecordRow;
use async_trait::async_trait;
use registrar_core::EntityKind;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for cleanup sweeps.
#[async_trait]
pub trait SweepRepo: Send + Sync {
    /// Soft-deleted records with `deleted_at <= cutoff`, oldest first.
    ///
    /// Eligibility is computed at query time; records soft-deleted after
    /// the query are not candidates for the calling sweep.
    async fn get_purge_candidates(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<RecordRow>>;

    /// Apply the SOFT_DELETED -> PURGED transition to one record: delete
    /// the row and write its tombstone, in a single transaction.
    ///
    /// Eligibility is re-checked inside the transaction, so a record that
    /// was purged by a concurrent sweep, restored, or re-deleted after the
    /// candidate query is skipped. Returns whether the record was purged.
    async fn purge_record(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        cutoff: OffsetDateTime,
        purged_at: OffsetDateTime,
    ) -> MetadataResult<bool>;
}
