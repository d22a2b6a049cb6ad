//! TabGroupPlatform trait: the four tab-group calls the reconciler needs.
//! Every call is a suspension point; implementations may be slow or fail.

use std::sync::Arc;

use async_trait::async_trait;
use tabgroup_core::{GroupHandle, GroupInfo, GroupProperties, TabId};

use crate::error::PlatformError;

/// Tab-group operations of the host browser. Enables mock injection for testing.
#[async_trait]
pub trait TabGroupPlatform: Send + Sync {
    /// All live groups across every window.
    async fn query_groups(&self) -> Result<Vec<GroupInfo>, PlatformError>;

    /// Put `tab` in a brand-new group and return its handle.
    async fn create_group_from_tab(&self, tab: TabId) -> Result<GroupHandle, PlatformError>;

    /// Move `tab` into an existing group. Fails with
    /// [`PlatformError::InvalidGroup`] when the group is gone.
    async fn move_tab_to_group(&self, tab: TabId, group: GroupHandle)
    -> Result<(), PlatformError>;

    async fn set_group_properties(
        &self,
        group: GroupHandle,
        props: GroupProperties,
    ) -> Result<(), PlatformError>;
}

#[async_trait]
impl<T: TabGroupPlatform + ?Sized> TabGroupPlatform for Arc<T> {
    async fn query_groups(&self) -> Result<Vec<GroupInfo>, PlatformError> {
        (**self).query_groups().await
    }

    async fn create_group_from_tab(&self, tab: TabId) -> Result<GroupHandle, PlatformError> {
        (**self).create_group_from_tab(tab).await
    }

    async fn move_tab_to_group(
        &self,
        tab: TabId,
        group: GroupHandle,
    ) -> Result<(), PlatformError> {
        (**self).move_tab_to_group(tab, group).await
    }

    async fn set_group_properties(
        &self,
        group: GroupHandle,
        props: GroupProperties,
    ) -> Result<(), PlatformError> {
        (**self).set_group_properties(group, props).await
    }
}
