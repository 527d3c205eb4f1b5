//! Stats repository: consistent lifecycle counts for observability.

use crate::error::MetadataResult;
use crate::models::StatsSnapshot;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for lifecycle statistics.
#[async_trait]
pub trait StatsRepo: Send + Sync {
    /// Per-kind active/soft-deleted/purged counts and soft-deletion age
    /// bounds, read inside a single transaction so a concurrent sweep
    /// cannot produce impossible totals.
    async fn stats(&self, taken_at: OffsetDateTime) -> MetadataResult<StatsSnapshot>;
}
