//! Database models mapping to the registrar schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Lifecycle-managed records
// =============================================================================

/// A lifecycle-managed record.
///
/// State is derived from `deleted_at`: NULL means ACTIVE, set means
/// SOFT_DELETED. A purged record has no row here, only a tombstone.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub record_id: Uuid,
    pub entity_kind: String,
    /// Externally visible identifier, immutable once issued.
    pub unique_id: String,
    pub display_name: String,
    pub parent_kind: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
    pub deleted_by: Option<Uuid>,
    pub deletion_reason: Option<String>,
}

impl RecordRow {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// =============================================================================
// Tombstones
// =============================================================================

/// Tombstone for a purged record.
///
/// Keeps the `unique_id` reserved forever; existence checks during
/// identifier issuance consult tombstones as well as live records.
#[derive(Debug, Clone, FromRow)]
pub struct TombstoneRow {
    pub tombstone_id: Uuid,
    pub entity_kind: String,
    pub record_id: Uuid,
    pub unique_id: String,
    pub deleted_at: OffsetDateTime,
    pub deleted_by: Option<Uuid>,
    pub deletion_reason: Option<String>,
    pub purged_at: OffsetDateTime,
}

// =============================================================================
// Stats
// =============================================================================

/// Per-kind lifecycle counts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KindStats {
    pub entity_kind: String,
    pub active_count: u64,
    pub soft_deleted_count: u64,
    pub purged_count: u64,
    pub oldest_soft_deleted: Option<OffsetDateTime>,
    pub newest_soft_deleted: Option<OffsetDateTime>,
}

impl KindStats {
    /// Total records ever seen for this kind (live rows plus tombstones).
    pub fn total(&self) -> u64 {
        self.active_count + self.soft_deleted_count + self.purged_count
    }
}

/// Consistent snapshot of lifecycle counts across all entity kinds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatsSnapshot {
    pub taken_at: OffsetDateTime,
    pub kinds: Vec<KindStats>,
}
