//! In-memory browser: tabs, groups and the drift the real one exhibits.
//!
//! Mirrors the host behavior the reconciler depends on:
//! - group ids are integers handed out in increasing order;
//! - a group that loses its last tab disappears;
//! - users may close or rename groups at any time (`close_group`,
//!   `rename_group`), invalidating cached handles.
//!
//! Also counts calls and can fail the next call of a given operation, so
//! tests can assert exactly what the reconciler asked for.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tabgroup_core::{GroupHandle, GroupInfo, GroupProperties, TabId};

use crate::error::PlatformError;
use crate::platform::TabGroupPlatform;

/// Platform operation, for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    QueryGroups,
    CreateGroup,
    MoveTab,
    SetProperties,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Self::QueryGroups => "query_groups",
            Self::CreateGroup => "create_group_from_tab",
            Self::MoveTab => "move_tab_to_group",
            Self::SetProperties => "set_group_properties",
        }
    }
}

/// Number of calls per operation since creation (or the last reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounts {
    pub query_groups: usize,
    pub create_group: usize,
    pub move_tab: usize,
    pub set_properties: usize,
}

/// A live group as the simulated browser holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimGroup {
    pub id: GroupHandle,
    pub title: Option<String>,
    pub collapsed: bool,
    pub tabs: BTreeSet<TabId>,
}

#[derive(Debug, Default)]
struct BrowserState {
    next_group_id: i64,
    groups: BTreeMap<GroupHandle, SimGroup>,
    tab_group: HashMap<TabId, GroupHandle>,
    closed_tabs: HashSet<TabId>,
    calls: CallCounts,
    pending_failures: HashMap<Op, usize>,
}

impl BrowserState {
    fn record(&mut self, op: Op) -> Result<(), PlatformError> {
        match op {
            Op::QueryGroups => self.calls.query_groups += 1,
            Op::CreateGroup => self.calls.create_group += 1,
            Op::MoveTab => self.calls.move_tab += 1,
            Op::SetProperties => self.calls.set_properties += 1,
        }
        if let Some(remaining) = self.pending_failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(PlatformError::Rejected {
                op: op.name(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn check_tab(&self, tab: TabId) -> Result<(), PlatformError> {
        if self.closed_tabs.contains(&tab) {
            return Err(PlatformError::InvalidTab(tab));
        }
        Ok(())
    }

    fn new_group(&mut self) -> GroupHandle {
        self.next_group_id += 1;
        let id = GroupHandle(self.next_group_id);
        self.groups.insert(
            id,
            SimGroup {
                id,
                title: None,
                collapsed: false,
                tabs: BTreeSet::new(),
            },
        );
        id
    }

    /// Take `tab` out of whatever group holds it, dropping emptied groups.
    fn detach(&mut self, tab: TabId) {
        let Some(prev) = self.tab_group.remove(&tab) else {
            return;
        };
        let emptied = self.groups.get_mut(&prev).is_some_and(|g| {
            g.tabs.remove(&tab);
            g.tabs.is_empty()
        });
        if emptied {
            self.groups.remove(&prev);
        }
    }

    fn attach(&mut self, tab: TabId, group: GroupHandle) {
        if self.tab_group.get(&tab) == Some(&group) {
            return;
        }
        self.detach(tab);
        if let Some(g) = self.groups.get_mut(&group) {
            g.tabs.insert(tab);
            self.tab_group.insert(tab, group);
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
    latency: Option<Duration>,
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every platform call by `latency`, giving other tasks a chance
    /// to interleave.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrowserState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        match self.latency {
            Some(d) => tokio::time::sleep(d).await,
            None => tokio::task::yield_now().await,
        }
    }

    // ── Outside-world mutations (not part of the platform trait) ──

    /// Group `tabs` under `title`, the way a user would by hand.
    /// With no tabs the group lingers until a tab joins and leaves it.
    pub fn seed_group(&self, title: &str, tabs: &[TabId]) -> GroupHandle {
        let mut st = self.lock();
        let id = st.new_group();
        if let Some(g) = st.groups.get_mut(&id) {
            g.title = Some(title.to_string());
        }
        for &tab in tabs {
            st.closed_tabs.remove(&tab);
            st.attach(tab, id);
        }
        id
    }

    /// Close a group and ungroup its tabs. Returns false if it did not exist.
    pub fn close_group(&self, group: GroupHandle) -> bool {
        let mut st = self.lock();
        let Some(g) = st.groups.remove(&group) else {
            return false;
        };
        for tab in g.tabs {
            st.tab_group.remove(&tab);
        }
        true
    }

    /// Retitle a group. Returns false if it did not exist.
    pub fn rename_group(&self, group: GroupHandle, title: &str) -> bool {
        let mut st = self.lock();
        match st.groups.get_mut(&group) {
            Some(g) => {
                g.title = Some(title.to_string());
                true
            }
            None => false,
        }
    }

    /// Close a tab; later calls naming it fail with `InvalidTab`.
    pub fn close_tab(&self, tab: TabId) {
        let mut st = self.lock();
        st.detach(tab);
        st.closed_tabs.insert(tab);
    }

    /// Collapse a group, as a user clicking its chip would.
    pub fn collapse_group(&self, group: GroupHandle) -> bool {
        let mut st = self.lock();
        match st.groups.get_mut(&group) {
            Some(g) => {
                g.collapsed = true;
                true
            }
            None => false,
        }
    }

    /// Fail the next `times` calls of `op` with `PlatformError::Rejected`.
    pub fn fail_next(&self, op: Op, times: usize) {
        *self.lock().pending_failures.entry(op).or_insert(0) += times;
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn groups(&self) -> Vec<SimGroup> {
        self.lock().groups.values().cloned().collect()
    }

    pub fn group(&self, id: GroupHandle) -> Option<SimGroup> {
        self.lock().groups.get(&id).cloned()
    }

    pub fn group_of(&self, tab: TabId) -> Option<GroupHandle> {
        self.lock().tab_group.get(&tab).copied()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }
}

#[async_trait]
impl TabGroupPlatform for SimulatedBrowser {
    async fn query_groups(&self) -> Result<Vec<GroupInfo>, PlatformError> {
        self.pause().await;
        let mut st = self.lock();
        st.record(Op::QueryGroups)?;
        Ok(st
            .groups
            .values()
            .map(|g| GroupInfo {
                id: g.id,
                title: g.title.clone(),
                collapsed: g.collapsed,
            })
            .collect())
    }

    async fn create_group_from_tab(&self, tab: TabId) -> Result<GroupHandle, PlatformError> {
        self.pause().await;
        let mut st = self.lock();
        st.record(Op::CreateGroup)?;
        st.check_tab(tab)?;
        let id = st.new_group();
        st.attach(tab, id);
        Ok(id)
    }

    async fn move_tab_to_group(
        &self,
        tab: TabId,
        group: GroupHandle,
    ) -> Result<(), PlatformError> {
        self.pause().await;
        let mut st = self.lock();
        st.record(Op::MoveTab)?;
        st.check_tab(tab)?;
        if !st.groups.contains_key(&group) {
            return Err(PlatformError::InvalidGroup(group));
        }
        st.attach(tab, group);
        Ok(())
    }

    async fn set_group_properties(
        &self,
        group: GroupHandle,
        props: GroupProperties,
    ) -> Result<(), PlatformError> {
        self.pause().await;
        let mut st = self.lock();
        st.record(Op::SetProperties)?;
        let g = st
            .groups
            .get_mut(&group)
            .ok_or(PlatformError::InvalidGroup(group))?;
        if let Some(title) = props.title {
            g.title = Some(title);
        }
        g.collapsed = props.collapsed;
        Ok(())
    }
}
