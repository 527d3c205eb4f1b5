//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid unique id: {0}")]
    InvalidUniqueId(String),

    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("unknown id kind: {0}")]
    UnknownIdKind(String),

    #[error("invalid weekday: {0}")]
    InvalidWeekday(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
