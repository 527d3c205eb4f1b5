//! Record repository: lifecycle transitions short of purge.

use crate::error::MetadataResult;
use crate::models::RecordRow;
use async_trait::async_trait;
use registrar_core::EntityKind;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for lifecycle-managed records.
#[async_trait]
pub trait RecordRepo: Send + Sync {
    /// Insert a new ACTIVE record.
    ///
    /// The record-creation flow lives outside this subsystem; this exists
    /// for operator seeding and test fixtures, and enforces the same
    /// uniqueness and parent-kind rules the external flow relies on.
    async fn create_record(&self, record: &RecordRow) -> MetadataResult<()>;

    /// Get a record by kind and internal id.
    async fn get_record(
        &self,
        kind: EntityKind,
        record_id: Uuid,
    ) -> MetadataResult<Option<RecordRow>>;

    /// Get a record by its externally visible identifier.
    async fn get_record_by_unique_id(
        &self,
        unique_id: &str,
    ) -> MetadataResult<Option<RecordRow>>;

    /// Check whether a unique id is taken, by a live record or a tombstone.
    ///
    /// This is the existence check behind identifier issuance; tombstones
    /// count so purged identifiers are never reissued.
    async fn unique_id_exists(&self, unique_id: &str) -> MetadataResult<bool>;

    /// Direct children of a record, in the declared dependency graph.
    async fn get_children(
        &self,
        kind: EntityKind,
        record_id: Uuid,
    ) -> MetadataResult<Vec<RecordRow>>;

    /// Transition a record and all transitively reachable ACTIVE
    /// descendants to SOFT_DELETED, in a single transaction.
    ///
    /// Descendants that are already soft-deleted keep their original
    /// deletion stamp and are not descended into. Returns the number of
    /// rows transitioned.
    async fn soft_delete_cascade(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        deleted_by: Option<Uuid>,
        reason: Option<&str>,
        deleted_at: OffsetDateTime,
    ) -> MetadataResult<u64>;

    /// Transition a SOFT_DELETED record back to ACTIVE.
    ///
    /// Guard: the record's parent, if any, must exist and be ACTIVE.
    /// Children are never restored implicitly.
    async fn restore_record(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        restored_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
