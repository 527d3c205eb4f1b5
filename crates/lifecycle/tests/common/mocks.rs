//! Instrumented metadata store for exercising failure paths.

use async_trait::async_trait;
use registrar_core::EntityKind;
use registrar_metadata::models::{RecordRow, StatsSnapshot, TombstoneRow};
use registrar_metadata::repos::{RecordRepo, StatsRepo, SweepRepo, TombstoneRepo};
use registrar_metadata::{MetadataError, MetadataResult, MetadataStore, SqliteStore};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// Wraps a real SQLite store and injects failures on selected paths.
/// Everything not overridden delegates to the inner store.
pub struct InstrumentedStore {
    inner: SqliteStore,
    /// Record ids whose purge fails with an injected error.
    pub fail_purge_for: Mutex<HashSet<Uuid>>,
    /// Scripted responses for `unique_id_exists`; empty means delegate.
    pub exists_script: Mutex<VecDeque<bool>>,
    /// Report every unique id as taken.
    pub saturate_exists: AtomicBool,
    /// Number of `unique_id_exists` calls observed.
    pub exists_calls: AtomicU32,
}

impl InstrumentedStore {
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        Ok(Self {
            inner: SqliteStore::new(path, None).await?,
            fail_purge_for: Mutex::new(HashSet::new()),
            exists_script: Mutex::new(VecDeque::new()),
            saturate_exists: AtomicBool::new(false),
            exists_calls: AtomicU32::new(0),
        })
    }

    pub fn fail_purge_of(&self, record_id: Uuid) {
        self.fail_purge_for.lock().unwrap().insert(record_id);
    }

    pub fn script_exists_responses(&self, responses: &[bool]) {
        self.exists_script
            .lock()
            .unwrap()
            .extend(responses.iter().copied());
    }
}

#[async_trait]
impl MetadataStore for InstrumentedStore {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl RecordRepo for InstrumentedStore {
    async fn create_record(&self, record: &RecordRow) -> MetadataResult<()> {
        self.inner.create_record(record).await
    }

    async fn get_record(
        &self,
        kind: EntityKind,
        record_id: Uuid,
    ) -> MetadataResult<Option<RecordRow>> {
        self.inner.get_record(kind, record_id).await
    }

    async fn get_record_by_unique_id(&self, unique_id: &str) -> MetadataResult<Option<RecordRow>> {
        self.inner.get_record_by_unique_id(unique_id).await
    }

    async fn unique_id_exists(&self, unique_id: &str) -> MetadataResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.saturate_exists.load(Ordering::SeqCst) {
            return Ok(true);
        }
        if let Some(scripted) = self.exists_script.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        self.inner.unique_id_exists(unique_id).await
    }

    async fn get_children(
        &self,
        kind: EntityKind,
        record_id: Uuid,
    ) -> MetadataResult<Vec<RecordRow>> {
        self.inner.get_children(kind, record_id).await
    }

    async fn soft_delete_cascade(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        deleted_by: Option<Uuid>,
        reason: Option<&str>,
        deleted_at: OffsetDateTime,
    ) -> MetadataResult<u64> {
        self.inner
            .soft_delete_cascade(kind, record_id, deleted_by, reason, deleted_at)
            .await
    }

    async fn restore_record(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        restored_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        self.inner.restore_record(kind, record_id, restored_at).await
    }
}

#[async_trait]
impl SweepRepo for InstrumentedStore {
    async fn get_purge_candidates(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<RecordRow>> {
        self.inner.get_purge_candidates(cutoff, limit).await
    }

    async fn purge_record(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        cutoff: OffsetDateTime,
        purged_at: OffsetDateTime,
    ) -> MetadataResult<bool> {
        if self.fail_purge_for.lock().unwrap().contains(&record_id) {
            return Err(MetadataError::Internal(format!(
                "injected purge failure for {record_id}"
            )));
        }
        self.inner
            .purge_record(kind, record_id, cutoff, purged_at)
            .await
    }
}

#[async_trait]
impl TombstoneRepo for InstrumentedStore {
    async fn get_tombstone(&self, unique_id: &str) -> MetadataResult<Option<TombstoneRow>> {
        self.inner.get_tombstone(unique_id).await
    }

    async fn is_tombstoned(&self, kind: EntityKind, record_id: Uuid) -> MetadataResult<bool> {
        self.inner.is_tombstoned(kind, record_id).await
    }

    async fn list_tombstones(&self, limit: u32) -> MetadataResult<Vec<TombstoneRow>> {
        self.inner.list_tombstones(limit).await
    }
}

#[async_trait]
impl StatsRepo for InstrumentedStore {
    async fn stats(&self, taken_at: OffsetDateTime) -> MetadataResult<StatsSnapshot> {
        self.inner.stats(taken_at).await
    }
}
