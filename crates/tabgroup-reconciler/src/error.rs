//! Failures inside one reconciliation. Logged, turned into an outcome,
//! never propagated to the event source.

use tabgroup_browser::{PlatformError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("querying groups failed: {0}")]
    Query(#[source] PlatformError),

    #[error("creating group failed: {0}")]
    Create(#[source] PlatformError),

    #[error("moving tab failed: {0}")]
    Move(#[source] PlatformError),

    #[error("persisting ticket map failed: {0}")]
    Persist(#[from] StoreError),
}
