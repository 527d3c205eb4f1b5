//! Collision-safe unique identifier issuance.

use crate::error::{LifecycleError, LifecycleResult};
use rand::Rng;
use registrar_core::unique_id::SUFFIX_ALPHABET;
use registrar_core::{IdKind, UniqueId};
use registrar_metadata::MetadataStore;
use std::sync::Arc;

/// Issues unique identifiers, checking candidates against the store.
///
/// Issuance takes no reservation lock; the caller must insert the returned
/// identifier inside the same transaction that creates the record, which
/// closes the check-then-insert window. The unique index on `unique_id`
/// backstops the residual race.
pub struct IdentifierIssuer {
    metadata: Arc<dyn MetadataStore>,
    max_attempts: u32,
}

impl IdentifierIssuer {
    /// Create an issuer with the given retry bound.
    pub fn new(metadata: Arc<dyn MetadataStore>, max_attempts: u32) -> Self {
        Self {
            metadata,
            max_attempts,
        }
    }

    /// Issue a fresh identifier of the given kind.
    ///
    /// Retries on collision up to the configured bound. Exhaustion is not
    /// retried further: the keyspace is large enough that it signals a
    /// broken RNG or near-full keyspace, both operator-actionable.
    pub async fn issue(&self, kind: IdKind) -> LifecycleResult<UniqueId> {
        for attempt in 1..=self.max_attempts {
            let candidate = random_unique_id(kind);
            if !self.metadata.unique_id_exists(candidate.as_str()).await? {
                if attempt > 1 {
                    tracing::debug!(
                        kind = kind.as_str(),
                        attempt = attempt,
                        "Identifier issued after collisions"
                    );
                }
                return Ok(candidate);
            }
        }

        tracing::error!(
            kind = kind.as_str(),
            attempts = self.max_attempts,
            "Identifier issuance exhausted its retry budget"
        );
        Err(LifecycleError::IdentifierExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Draw a random candidate identifier for the kind.
fn random_unique_id(kind: IdKind) -> UniqueId {
    let mut rng = rand::rng();
    let suffix: String = (0..kind.suffix_len())
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    UniqueId::parse(&kind.compose(&suffix)).expect("generated suffix matches its kind format")
}
