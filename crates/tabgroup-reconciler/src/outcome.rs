use serde::Serialize;
use tabgroup_core::{ClassificationKey, GroupHandle, TabId};

/// Where an existing group's handle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSource {
    Cache,
    Live,
}

/// What handling one tab update did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No key for this event; nothing was touched.
    Skipped { tab: TabId },
    /// Tab moved into an existing group.
    Joined {
        tab: TabId,
        key: ClassificationKey,
        group: GroupHandle,
        source: GroupSource,
    },
    /// A new group was made from the tab.
    Created {
        tab: TabId,
        key: ClassificationKey,
        group: GroupHandle,
    },
    /// The handle was rejected and dropped from the cache; tab left as is.
    Evicted {
        tab: TabId,
        key: ClassificationKey,
        group: GroupHandle,
    },
    Failed {
        tab: TabId,
        key: ClassificationKey,
        reason: String,
    },
}

impl ReconcileOutcome {
    /// Group the tab ended up in, if any.
    pub fn group(&self) -> Option<GroupHandle> {
        match self {
            Self::Joined { group, .. } | Self::Created { group, .. } => Some(*group),
            _ => None,
        }
    }

    pub fn tab(&self) -> TabId {
        match self {
            Self::Skipped { tab }
            | Self::Joined { tab, .. }
            | Self::Created { tab, .. }
            | Self::Evicted { tab, .. }
            | Self::Failed { tab, .. } => *tab,
        }
    }
}
