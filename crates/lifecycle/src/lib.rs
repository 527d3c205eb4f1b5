//! Lifecycle command surface for Registrar.
//!
//! This crate hosts the components that drive record archival:
//! - `LifecycleService`: soft-delete, restore, cleanup sweeps, and stats
//! - `IdentifierIssuer`: collision-safe unique identifier issuance
//! - `ArchivalScheduler`: recurring sweeps on a daily/weekly/monthly cadence

pub mod error;
pub mod issuer;
pub mod scheduler;
pub mod service;

pub use error::{LifecycleError, LifecycleResult};
pub use issuer::IdentifierIssuer;
pub use scheduler::{ArchivalScheduler, Cadence};
pub use service::{CleanupJob, LifecycleService};
