use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Identity ─────────────────────────────────────────────────────

/// Platform-assigned tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

/// Opaque handle for a platform-managed tab group.
///
/// Only the platform mints these; the reconciler obtains one either by
/// querying live groups or by asking the platform to create a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupHandle(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Groups ───────────────────────────────────────────────────────

/// A live group as reported by `query_groups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: GroupHandle,
    /// Groups can be untitled; the platform reports those as `None`.
    pub title: Option<String>,
    pub collapsed: bool,
}

impl GroupInfo {
    pub fn has_title(&self, title: &str) -> bool {
        self.title.as_deref() == Some(title)
    }
}

/// Property update for `set_group_properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProperties {
    /// `None` leaves the title unchanged.
    pub title: Option<String>,
    pub collapsed: bool,
}

impl GroupProperties {
    /// Expand without touching the title.
    pub fn expanded() -> Self {
        Self {
            title: None,
            collapsed: false,
        }
    }

    /// Set the title and expand.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            collapsed: false,
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────

/// A "tab updated" notification, in the camelCase shape the browser emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabUpdateEvent {
    pub tab_id: TabId,
    #[serde(default)]
    pub change_info: ChangeInfo,
    pub tab: TabSnapshot,
}

/// The subset of the update that changed. Only the title matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The tab's state after the update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    #[serde(default)]
    pub url: String,
}

impl TabUpdateEvent {
    pub fn new(tab_id: i64, title: Option<&str>, url: &str) -> Self {
        Self {
            tab_id: TabId(tab_id),
            change_info: ChangeInfo {
                title: title.map(str::to_string),
            },
            tab: TabSnapshot {
                url: url.to_string(),
            },
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.change_info.title.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.tab.url
    }
}
