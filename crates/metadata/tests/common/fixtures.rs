//! Record fixtures for store tests.

use registrar_core::EntityKind;
use registrar_metadata::models::RecordRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Build an ACTIVE root record (no parent).
pub fn root_record(kind: EntityKind, unique_id: &str, name: &str) -> RecordRow {
    let now = OffsetDateTime::now_utc();
    RecordRow {
        record_id: Uuid::new_v4(),
        entity_kind: kind.as_str().to_string(),
        unique_id: unique_id.to_string(),
        display_name: name.to_string(),
        parent_kind: None,
        parent_id: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        deleted_by: None,
        deletion_reason: None,
    }
}

/// Build an ACTIVE child record under the given parent.
pub fn child_record(
    kind: EntityKind,
    unique_id: &str,
    name: &str,
    parent: &RecordRow,
) -> RecordRow {
    let mut record = root_record(kind, unique_id, name);
    record.parent_kind = Some(parent.entity_kind.clone());
    record.parent_id = Some(parent.record_id);
    record
}
