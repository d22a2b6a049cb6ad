//! Per-group-title async locks.
//!
//! Resolve-or-create for one group title runs under that title's lock, so
//! two updates for the same new ticket cannot both create a group. A
//! ticket key spelled `Hotfix` and the hotfix sentinel share one lock.
//! Different titles never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the group titled `title`.
    pub async fn acquire(&self, title: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop locks nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(title.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Titles currently held or waited on.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|l| Arc::strong_count(l) > 1).count()
    }
}
