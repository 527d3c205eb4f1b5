//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{RecordRepo, StatsRepo, SweepRepo, TombstoneRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    RecordRepo + SweepRepo + TombstoneRepo + StatsRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    #[allow(dead_code)] // Reserved for a future timeout wrapper
    query_timeout_secs: u64,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("cannot create db directory: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures when the scheduler and an
            // operator command write at the same time.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout_secs,
        };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use registrar_core::{EntityKind, LifecycleState};
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Validate the parent columns of a record against the declared graph.
    fn check_parent_declaration(record: &RecordRow, kind: EntityKind) -> MetadataResult<()> {
        match (&record.parent_kind, &record.parent_id) {
            (None, None) => Ok(()),
            (Some(parent_kind), Some(_)) => {
                let declared = kind.parent_kind().map(|k| k.as_str());
                if declared == Some(parent_kind.as_str()) {
                    Ok(())
                } else {
                    Err(MetadataError::GuardViolation(format!(
                        "{} cannot have a {} parent",
                        kind, parent_kind
                    )))
                }
            }
            _ => Err(MetadataError::Internal(
                "parent_kind and parent_id must be set together".to_string(),
            )),
        }
    }

    #[async_trait]
    impl RecordRepo for SqliteStore {
        async fn create_record(&self, record: &RecordRow) -> MetadataResult<()> {
            let kind = EntityKind::from_str(&record.entity_kind)
                .map_err(|e| MetadataError::Internal(e.to_string()))?;
            check_parent_declaration(record, kind)?;

            let mut tx = self.pool.begin().await?;

            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM records WHERE unique_id = ?1)
                     OR EXISTS(SELECT 1 FROM tombstones WHERE unique_id = ?1)",
            )
            .bind(&record.unique_id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(MetadataError::AlreadyExists(format!(
                    "unique_id {} already exists",
                    record.unique_id
                )));
            }

            // A record may not be created under a missing or deleted parent.
            if let (Some(parent_kind), Some(parent_id)) = (&record.parent_kind, record.parent_id) {
                let parent = sqlx::query_as::<_, RecordRow>(
                    "SELECT * FROM records WHERE entity_kind = ? AND record_id = ?",
                )
                .bind(parent_kind)
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?;

                match parent {
                    None => {
                        return Err(MetadataError::NotFound(format!(
                            "parent {parent_kind} {parent_id} not found"
                        )));
                    }
                    Some(parent) if !parent.is_active() => {
                        return Err(MetadataError::GuardViolation(format!(
                            "parent {parent_kind} {parent_id} is not active"
                        )));
                    }
                    Some(_) => {}
                }
            }

            sqlx::query(
                r#"
                INSERT INTO records (
                    record_id, entity_kind, unique_id, display_name,
                    parent_kind, parent_id, created_at, updated_at,
                    deleted_at, deleted_by, deletion_reason
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.record_id)
            .bind(&record.entity_kind)
            .bind(&record.unique_id)
            .bind(&record.display_name)
            .bind(&record.parent_kind)
            .bind(record.parent_id)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.deleted_at)
            .bind(record.deleted_by)
            .bind(&record.deletion_reason)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_record(
            &self,
            kind: EntityKind,
            record_id: Uuid,
        ) -> MetadataResult<Option<RecordRow>> {
            let row = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE entity_kind = ? AND record_id = ?",
            )
            .bind(kind.as_str())
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_record_by_unique_id(
            &self,
            unique_id: &str,
        ) -> MetadataResult<Option<RecordRow>> {
            let row =
                sqlx::query_as::<_, RecordRow>("SELECT * FROM records WHERE unique_id = ?")
                    .bind(unique_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn unique_id_exists(&self, unique_id: &str) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM records WHERE unique_id = ?1)
                     OR EXISTS(SELECT 1 FROM tombstones WHERE unique_id = ?1)",
            )
            .bind(unique_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn get_children(
            &self,
            kind: EntityKind,
            record_id: Uuid,
        ) -> MetadataResult<Vec<RecordRow>> {
            let rows = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE parent_kind = ? AND parent_id = ? ORDER BY created_at",
            )
            .bind(kind.as_str())
            .bind(record_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn soft_delete_cascade(
            &self,
            kind: EntityKind,
            record_id: Uuid,
            deleted_by: Option<Uuid>,
            reason: Option<&str>,
            deleted_at: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            let record = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE entity_kind = ? AND record_id = ?",
            )
            .bind(kind.as_str())
            .bind(record_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(record) = record else {
                let purged: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM tombstones WHERE entity_kind = ? AND record_id = ?)",
                )
                .bind(kind.as_str())
                .bind(record_id)
                .fetch_one(&mut *tx)
                .await?;
                if purged {
                    return Err(MetadataError::InvalidStateTransition {
                        from: LifecycleState::Purged.to_string(),
                        to: LifecycleState::SoftDeleted.to_string(),
                    });
                }
                return Err(MetadataError::NotFound(format!("{kind} {record_id} not found")));
            };

            if !record.is_active() {
                return Err(MetadataError::InvalidStateTransition {
                    from: LifecycleState::SoftDeleted.to_string(),
                    to: LifecycleState::SoftDeleted.to_string(),
                });
            }

            // Walk the declared dependency graph iteratively. Descendants
            // that were already soft-deleted keep their original stamp and
            // cannot have active children of their own, so they are not
            // descended into.
            let mut transitioned = 0u64;
            let mut worklist = vec![(kind, record_id)];
            while let Some((kind, record_id)) = worklist.pop() {
                let updated = sqlx::query(
                    "UPDATE records
                     SET deleted_at = ?, deleted_by = ?, deletion_reason = ?, updated_at = ?
                     WHERE entity_kind = ? AND record_id = ? AND deleted_at IS NULL",
                )
                .bind(deleted_at)
                .bind(deleted_by)
                .bind(reason)
                .bind(deleted_at)
                .bind(kind.as_str())
                .bind(record_id)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    continue;
                }
                transitioned += updated.rows_affected();

                if kind.children().is_empty() {
                    continue;
                }
                let children: Vec<(String, Uuid)> = sqlx::query_as(
                    "SELECT entity_kind, record_id FROM records
                     WHERE parent_kind = ? AND parent_id = ? AND deleted_at IS NULL",
                )
                .bind(kind.as_str())
                .bind(record_id)
                .fetch_all(&mut *tx)
                .await?;

                for (child_kind, child_id) in children {
                    let child_kind = EntityKind::from_str(&child_kind)
                        .map_err(|e| MetadataError::Internal(e.to_string()))?;
                    worklist.push((child_kind, child_id));
                }
            }

            tx.commit().await?;
            Ok(transitioned)
        }

        async fn restore_record(
            &self,
            kind: EntityKind,
            record_id: Uuid,
            restored_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let record = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE entity_kind = ? AND record_id = ?",
            )
            .bind(kind.as_str())
            .bind(record_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(record) = record else {
                let purged: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM tombstones WHERE entity_kind = ? AND record_id = ?)",
                )
                .bind(kind.as_str())
                .bind(record_id)
                .fetch_one(&mut *tx)
                .await?;
                if purged {
                    return Err(MetadataError::InvalidStateTransition {
                        from: LifecycleState::Purged.to_string(),
                        to: LifecycleState::Active.to_string(),
                    });
                }
                return Err(MetadataError::NotFound(format!("{kind} {record_id} not found")));
            };

            if record.is_active() {
                return Err(MetadataError::InvalidStateTransition {
                    from: LifecycleState::Active.to_string(),
                    to: LifecycleState::Active.to_string(),
                });
            }

            // Guard: a record cannot resurface under a deleted or purged
            // parent. A purged parent has no row, which fails the same way.
            if let (Some(parent_kind), Some(parent_id)) = (&record.parent_kind, record.parent_id)
            {
                let parent = sqlx::query_as::<_, RecordRow>(
                    "SELECT * FROM records WHERE entity_kind = ? AND record_id = ?",
                )
                .bind(parent_kind)
                .bind(parent_id)
                .fetch_optional(&mut *tx)
                .await?;

                match parent {
                    None => {
                        return Err(MetadataError::GuardViolation(format!(
                            "parent {parent_kind} {parent_id} has been purged"
                        )));
                    }
                    Some(parent) if !parent.is_active() => {
                        return Err(MetadataError::GuardViolation(format!(
                            "parent {parent_kind} {parent_id} is soft-deleted"
                        )));
                    }
                    Some(_) => {}
                }
            }

            sqlx::query(
                "UPDATE records
                 SET deleted_at = NULL, deleted_by = NULL, deletion_reason = NULL, updated_at = ?
                 WHERE entity_kind = ? AND record_id = ?",
            )
            .bind(restored_at)
            .bind(kind.as_str())
            .bind(record_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl SweepRepo for SqliteStore {
        async fn get_purge_candidates(
            &self,
            cutoff: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<RecordRow>> {
            // Oldest first, so a partially completed sweep makes maximal
            // forward progress.
            let rows = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records
                 WHERE deleted_at IS NOT NULL AND deleted_at <= ?
                 ORDER BY deleted_at ASC
                 LIMIT ?",
            )
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn purge_record(
            &self,
            kind: EntityKind,
            record_id: Uuid,
            cutoff: OffsetDateTime,
            purged_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let record = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE entity_kind = ? AND record_id = ?",
            )
            .bind(kind.as_str())
            .bind(record_id)
            .fetch_optional(&mut *tx)
            .await?;

            // Already purged by a concurrent sweep, restored, or re-deleted
            // inside the retention window: no longer eligible, skip.
            let Some(record) = record else {
                return Ok(false);
            };
            let Some(deleted_at) = record.deleted_at else {
                return Ok(false);
            };
            if deleted_at > cutoff {
                return Ok(false);
            }

            sqlx::query("DELETE FROM records WHERE entity_kind = ? AND record_id = ?")
                .bind(kind.as_str())
                .bind(record_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO tombstones (
                    tombstone_id, entity_kind, record_id, unique_id,
                    deleted_at, deleted_by, deletion_reason, purged_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&record.entity_kind)
            .bind(record.record_id)
            .bind(&record.unique_id)
            .bind(deleted_at)
            .bind(record.deleted_by)
            .bind(&record.deletion_reason)
            .bind(purged_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        }
    }

    #[async_trait]
    impl TombstoneRepo for SqliteStore {
        async fn get_tombstone(&self, unique_id: &str) -> MetadataResult<Option<TombstoneRow>> {
            let row = sqlx::query_as::<_, TombstoneRow>(
                "SELECT * FROM tombstones WHERE unique_id = ?",
            )
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn is_tombstoned(
            &self,
            kind: EntityKind,
            record_id: Uuid,
        ) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM tombstones WHERE entity_kind = ? AND record_id = ?)",
            )
            .bind(kind.as_str())
            .bind(record_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn list_tombstones(&self, limit: u32) -> MetadataResult<Vec<TombstoneRow>> {
            let rows = sqlx::query_as::<_, TombstoneRow>(
                "SELECT * FROM tombstones ORDER BY purged_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl StatsRepo for SqliteStore {
        async fn stats(&self, taken_at: OffsetDateTime) -> MetadataResult<StatsSnapshot> {
            // One transaction for the whole snapshot; counts taken across
            // separate transactions could disagree mid-sweep.
            let mut tx = self.pool.begin().await?;

            let mut kinds = Vec::with_capacity(EntityKind::ALL.len());
            for kind in EntityKind::ALL {
                let active: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM records WHERE entity_kind = ? AND deleted_at IS NULL",
                )
                .bind(kind.as_str())
                .fetch_one(&mut *tx)
                .await?;

                let soft_deleted: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM records WHERE entity_kind = ? AND deleted_at IS NOT NULL",
                )
                .bind(kind.as_str())
                .fetch_one(&mut *tx)
                .await?;

                let purged: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM tombstones WHERE entity_kind = ?")
                        .bind(kind.as_str())
                        .fetch_one(&mut *tx)
                        .await?;

                let (oldest, newest): (Option<OffsetDateTime>, Option<OffsetDateTime>) =
                    sqlx::query_as(
                        "SELECT MIN(deleted_at), MAX(deleted_at) FROM records
                         WHERE entity_kind = ? AND deleted_at IS NOT NULL",
                    )
                    .bind(kind.as_str())
                    .fetch_one(&mut *tx)
                    .await?;

                kinds.push(KindStats {
                    entity_kind: kind.as_str().to_string(),
                    active_count: active as u64,
                    soft_deleted_count: soft_deleted as u64,
                    purged_count: purged as u64,
                    oldest_soft_deleted: oldest,
                    newest_soft_deleted: newest,
                });
            }

            tx.commit().await?;
            Ok(StatsSnapshot { taken_at, kinds })
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Lifecycle-managed records. State is derived from deleted_at:
-- NULL = active, set = soft-deleted. Purged rows are deleted and
-- tombstoned.
CREATE TABLE IF NOT EXISTS records (
    record_id BLOB PRIMARY KEY,
    entity_kind TEXT NOT NULL,
    unique_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    parent_kind TEXT,
    parent_id BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    deleted_by BLOB,
    deletion_reason TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_unique_id ON records(unique_id);
CREATE INDEX IF NOT EXISTS idx_records_deleted_at ON records(deleted_at);
-- Partial index backing active-record queries
CREATE INDEX IF NOT EXISTS idx_records_active ON records(entity_kind) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_records_parent ON records(parent_kind, parent_id);

-- Tombstones reserve purged unique ids forever.
CREATE TABLE IF NOT EXISTS tombstones (
    tombstone_id BLOB PRIMARY KEY,
    entity_kind TEXT NOT NULL,
    record_id BLOB NOT NULL,
    unique_id TEXT NOT NULL,
    deleted_at TEXT NOT NULL,
    deleted_by BLOB,
    deletion_reason TEXT,
    purged_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tombstones_unique_id ON tombstones(unique_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tombstones_record ON tombstones(entity_kind, record_id);
CREATE INDEX IF NOT EXISTS idx_tombstones_purged_at ON tombstones(purged_at);
"#;
