//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{RecordRepo, StatsRepo, SweepRepo, TombstoneRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use registrar_core::{EntityKind, LifecycleState};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;

        // Server-side statement timeout prevents hung sweep queries from
        // wedging the pool.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

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
impl RecordRepo for PostgresStore {
    async fn create_record(&self, record: &RecordRow) -> MetadataResult<()> {
        let kind = EntityKind::from_str(&record.entity_kind)
            .map_err(|e| MetadataError::Internal(e.to_string()))?;
        check_parent_declaration(record, kind)?;

        let mut tx = self.pool.begin().await?;

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM records WHERE unique_id = $1)
                 OR EXISTS(SELECT 1 FROM tombstones WHERE unique_id = $1)",
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

        if let (Some(parent_kind), Some(parent_id)) = (&record.parent_kind, record.parent_id) {
            let parent = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE entity_kind = $1 AND record_id = $2",
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
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
            "SELECT * FROM records WHERE entity_kind = $1 AND record_id = $2",
        )
        .bind(kind.as_str())
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_record_by_unique_id(&self, unique_id: &str) -> MetadataResult<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>("SELECT * FROM records WHERE unique_id = $1")
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn unique_id_exists(&self, unique_id: &str) -> MetadataResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM records WHERE unique_id = $1)
                 OR EXISTS(SELECT 1 FROM tombstones WHERE unique_id = $1)",
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
            "SELECT * FROM records WHERE parent_kind = $1 AND parent_id = $2 ORDER BY created_at",
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
            "SELECT * FROM records WHERE entity_kind = $1 AND record_id = $2 FOR UPDATE",
        )
        .bind(kind.as_str())
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            let purged: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM tombstones WHERE entity_kind = $1 AND record_id = $2)",
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

        let mut transitioned = 0u64;
        let mut worklist = vec![(kind, record_id)];
        while let Some((kind, record_id)) = worklist.pop() {
            let updated = sqlx::query(
                "UPDATE records
                 SET deleted_at = $1, deleted_by = $2, deletion_reason = $3, updated_at = $1
                 WHERE entity_kind = $4 AND record_id = $5 AND deleted_at IS NULL",
            )
            .bind(deleted_at)
            .bind(deleted_by)
            .bind(reason)
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
                 WHERE parent_kind = $1 AND parent_id = $2 AND deleted_at IS NULL",
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
            "SELECT * FROM records WHERE entity_kind = $1 AND record_id = $2 FOR UPDATE",
        )
        .bind(kind.as_str())
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            let purged: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM tombstones WHERE entity_kind = $1 AND record_id = $2)",
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

        if let (Some(parent_kind), Some(parent_id)) = (&record.parent_kind, record.parent_id) {
            let parent = sqlx::query_as::<_, RecordRow>(
                "SELECT * FROM records WHERE entity_kind = $1 AND record_id = $2",
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
             SET deleted_at = NULL, deleted_by = NULL, deletion_reason = NULL, updated_at = $1
             WHERE entity_kind = $2 AND record_id = $3",
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
impl SweepRepo for PostgresStore {
    async fn get_purge_candidates(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<RecordRow>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records
             WHERE deleted_at IS NOT NULL AND deleted_at <= $1
             ORDER BY deleted_at ASC
             LIMIT $2",
        )
        .bind(cutoff)
        .bind(i64::from(limit))
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

        // Atomic eligibility re-check: the row lock from DELETE serializes
        // against a concurrent restore or sweep.
        let record = sqlx::query_as::<_, RecordRow>(
            "DELETE FROM records
             WHERE entity_kind = $1 AND record_id = $2
               AND deleted_at IS NOT NULL AND deleted_at <= $3
             RETURNING *",
        )
        .bind(kind.as_str())
        .bind(record_id)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            INSERT INTO tombstones (
                tombstone_id, entity_kind, record_id, unique_id,
                deleted_at, deleted_by, deletion_reason, purged_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.entity_kind)
        .bind(record.record_id)
        .bind(&record.unique_id)
        .bind(record.deleted_at)
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
impl TombstoneRepo for PostgresStore {
    async fn get_tombstone(&self, unique_id: &str) -> MetadataResult<Option<TombstoneRow>> {
        let row =
            sqlx::query_as::<_, TombstoneRow>("SELECT * FROM tombstones WHERE unique_id = $1")
                .bind(unique_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn is_tombstoned(&self, kind: EntityKind, record_id: Uuid) -> MetadataResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tombstones WHERE entity_kind = $1 AND record_id = $2)",
        )
        .bind(kind.as_str())
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_tombstones(&self, limit: u32) -> MetadataResult<Vec<TombstoneRow>> {
        let rows = sqlx::query_as::<_, TombstoneRow>(
            "SELECT * FROM tombstones ORDER BY purged_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl StatsRepo for PostgresStore {
    async fn stats(&self, taken_at: OffsetDateTime) -> MetadataResult<StatsSnapshot> {
        // REPEATABLE READ gives the whole snapshot one consistent view.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let mut kinds = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let (active, soft_deleted, oldest, newest): (
                i64,
                i64,
                Option<OffsetDateTime>,
                Option<OffsetDateTime>,
            ) = sqlx::query_as(
                "SELECT
                     COUNT(*) FILTER (WHERE deleted_at IS NULL),
                     COUNT(*) FILTER (WHERE deleted_at IS NOT NULL),
                     MIN(deleted_at),
                     MAX(deleted_at)
                 FROM records WHERE entity_kind = $1",
            )
            .bind(kind.as_str())
            .fetch_one(&mut *tx)
            .await?;

            let purged: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM tombstones WHERE entity_kind = $1")
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
