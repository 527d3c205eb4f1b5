//! Error taxonomy for the lifecycle command surface.

use registrar_metadata::MetadataError;
use thiserror::Error;

/// Errors surfaced to lifecycle callers.
///
/// None of these are retried internally: `RecordNotFound` and
/// `InvalidTransition` indicate caller logic errors, `GuardViolation` is
/// user-actionable, and `IdentifierExhausted` requires an operator to look
/// at RNG health or keyspace saturation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("record not found")]
    RecordNotFound,

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("guard violation: {0}")]
    GuardViolation(String),

    #[error("identifier issuance exhausted after {attempts} attempts")]
    IdentifierExhausted { attempts: u32 },

    #[error("metadata store error: {0}")]
    Metadata(MetadataError),
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

impl From<MetadataError> for LifecycleError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(_) => Self::RecordNotFound,
            MetadataError::InvalidStateTransition { from, to } => {
                Self::InvalidTransition { from, to }
            }
            MetadataError::GuardViolation(detail) => Self::GuardViolation(detail),
            other => Self::Metadata(other),
        }
    }
}
