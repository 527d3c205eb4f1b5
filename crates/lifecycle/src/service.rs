//! The lifecycle command surface: soft delete, restore, cleanup, stats.

use crate::error::LifecycleResult;
use registrar_core::EntityKind;
use registrar_core::config::{LoggingConfig, RetentionConfig};
use registrar_metadata::MetadataStore;
use registrar_metadata::models::StatsSnapshot;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Report for one cleanup sweep. Ephemeral: logged, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupJob {
    pub started_at: OffsetDateTime,
    pub retention_threshold_days: u32,
    /// Distinct eligible records examined by this run.
    pub candidate_count: u64,
    pub purged_count: u64,
    /// Per-record failures, in processing order. The sweep continues past
    /// them.
    pub errors: Vec<String>,
}

/// Commands and queries over lifecycle-managed records.
pub struct LifecycleService {
    metadata: Arc<dyn MetadataStore>,
    config: RetentionConfig,
    /// Verbose logging includes actor ids and deletion reasons; production
    /// output redacts both.
    verbose: bool,
}

impl LifecycleService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        config: RetentionConfig,
        logging: &LoggingConfig,
    ) -> Self {
        Self {
            metadata,
            config,
            verbose: logging.verbose,
        }
    }

    /// Configured default retention threshold in days.
    pub fn default_retention_days(&self) -> u32 {
        self.config.retention_days
    }

    /// Soft-delete a record, cascading to all reachable active dependents
    /// in one transaction. Returns the number of records transitioned.
    pub async fn soft_delete(
        &self,
        kind: EntityKind,
        record_id: Uuid,
        actor: Option<Uuid>,
        reason: Option<&str>,
    ) -> LifecycleResult<u64> {
        let deleted_at = OffsetDateTime::now_utc();
        let transitioned = self
            .metadata
            .soft_delete_cascade(kind, record_id, actor, reason, deleted_at)
            .await?;

        if self.verbose {
            tracing::info!(
                kind = %kind,
                record_id = %record_id,
                actor = ?actor,
                reason = ?reason,
                transitioned = transitioned,
                "Record soft-deleted"
            );
        } else {
            tracing::info!(
                kind = %kind,
                record_id = %record_id,
                transitioned = transitioned,
                "Record soft-deleted"
            );
        }
        Ok(transitioned)
    }

    /// Restore a soft-deleted record. Dependents are not restored.
    pub async fn restore(&self, kind: EntityKind, record_id: Uuid) -> LifecycleResult<()> {
        let restored_at = OffsetDateTime::now_utc();
        self.metadata
            .restore_record(kind, record_id, restored_at)
            .await?;
        tracing::info!(kind = %kind, record_id = %record_id, "Record restored");
        Ok(())
    }

    /// Run one purge sweep over records soft-deleted longer ago than the
    /// retention threshold.
    ///
    /// Idempotent: purged rows stop being candidates, so a re-run after a
    /// crash only re-processes what is still eligible. A single bad record
    /// is reported in the job's error list and does not abort the sweep.
    pub async fn run_cleanup(&self, retention_threshold_days: u32) -> LifecycleResult<CleanupJob> {
        let started_at = OffsetDateTime::now_utc();
        let cutoff = started_at - Duration::days(i64::from(retention_threshold_days));

        let mut job = CleanupJob {
            started_at,
            retention_threshold_days,
            candidate_count: 0,
            purged_count: 0,
            errors: Vec::new(),
        };

        // Records that failed this run; filtered from later batches so the
        // loop terminates even when nothing else makes progress.
        let mut failed: HashSet<Uuid> = HashSet::new();
        let mut iterations = 0u32;

        loop {
            iterations += 1;
            if iterations > self.config.max_sweep_iterations {
                tracing::warn!(
                    iterations = iterations,
                    max_iterations = self.config.max_sweep_iterations,
                    "Cleanup sweep exceeded max iterations, stopping early"
                );
                break;
            }

            let candidates = self
                .metadata
                .get_purge_candidates(cutoff, self.config.sweep_batch_size)
                .await?;
            let fresh: Vec<_> = candidates
                .into_iter()
                .filter(|record| !failed.contains(&record.record_id))
                .collect();
            if fresh.is_empty() {
                break;
            }

            for record in fresh {
                job.candidate_count += 1;

                let kind = match EntityKind::from_str(&record.entity_kind) {
                    Ok(kind) => kind,
                    Err(e) => {
                        failed.insert(record.record_id);
                        job.errors
                            .push(format!("{} {}: {e}", record.entity_kind, record.record_id));
                        continue;
                    }
                };

                match self
                    .metadata
                    .purge_record(kind, record.record_id, cutoff, OffsetDateTime::now_utc())
                    .await
                {
                    Ok(true) => job.purged_count += 1,
                    Ok(false) => {
                        // Raced with a concurrent sweep or restore; the
                        // record is simply no longer eligible.
                        failed.insert(record.record_id);
                        tracing::debug!(
                            kind = %kind,
                            record_id = %record.record_id,
                            "Purge candidate no longer eligible, skipped"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            kind = %kind,
                            record_id = %record.record_id,
                            error = %e,
                            "Failed to purge record, continuing sweep"
                        );
                        failed.insert(record.record_id);
                        job.errors.push(format!("{kind} {}: {e}", record.record_id));
                    }
                }
            }
        }

        tracing::info!(
            retention_days = retention_threshold_days,
            candidates = job.candidate_count,
            purged = job.purged_count,
            errors = job.errors.len(),
            "Cleanup sweep finished"
        );
        Ok(job)
    }

    /// Consistent per-kind lifecycle counts.
    pub async fn stats(&self) -> LifecycleResult<StatsSnapshot> {
        let snapshot = self.metadata.stats(OffsetDateTime::now_utc()).await?;
        Ok(snapshot)
    }
}
