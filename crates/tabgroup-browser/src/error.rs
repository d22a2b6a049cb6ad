//! Error types for the browser boundary.

use tabgroup_core::{GroupHandle, TabId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("no group with id {0}")]
    InvalidGroup(GroupHandle),

    #[error("no tab with id {0}")]
    InvalidTab(TabId),

    #[error("{op} rejected: {reason}")]
    Rejected { op: &'static str, reason: String },
}

impl PlatformError {
    /// The referenced group no longer exists (closed or never existed).
    pub fn is_stale_group(&self) -> bool {
        matches!(self, Self::InvalidGroup(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not a JSON object: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
