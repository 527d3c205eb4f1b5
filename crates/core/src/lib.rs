//! Core domain types and shared logic for the Registrar lifecycle subsystem.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Lifecycle states and the entity dependency graph
//! - Unique identifier formats, validation, and role extraction
//! - Configuration types

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod unique_id;

pub use error::{Error, Result};
pub use lifecycle::{EntityKind, LifecycleState};
pub use unique_id::{IdKind, Role, UniqueId};

/// Default soft-delete retention period in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Retention alternatives offered by interactive tooling.
pub const RETENTION_CHOICES_DAYS: [u32; 3] = [7, 30, 90];

/// Default bound on identifier issuance attempts before giving up.
///
/// The smallest suffix keyspace is 36^8, so hitting this bound signals a
/// broken RNG or a near-full keyspace, not bad luck.
pub const DEFAULT_ID_MAX_ATTEMPTS: u32 = 100;
