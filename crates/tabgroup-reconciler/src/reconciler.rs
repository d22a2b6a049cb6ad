//! Group reconciler.
//!
//! ## Hotfix path
//!
//! Looks the group up by title in the live list every time and never
//! touches the cache: there is one hotfix group and it is found by name.
//!
//! ## Ticket path
//!
//! 1. cache hit → move
//! 2. live group titled with the key → adopt into cache, move
//! 3. otherwise → create from the tab, title, expand, cache
//!
//! A rejected move drops the cache entry and persists. The tab stays where
//! it is; the next update for the same key resolves through live groups
//! again. No retry within one event.
//!
//! The cache is written through to the store after every mutation.

use tabgroup_browser::{KeyValueStore, PlatformError, StoreError, TabGroupPlatform};
use tabgroup_core::{
    ClassificationKey, GroupHandle, GroupProperties, HOTFIX_TITLE, TabId, TabUpdateEvent,
    TicketGroupMap, extract_key, is_ticket_id,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::ReconcileError;
use crate::key_lock::KeyLocks;
use crate::outcome::{GroupSource, ReconcileOutcome};

pub struct Reconciler<P, S> {
    platform: P,
    store: S,
    config: ReconcilerConfig,
    cache: Mutex<TicketGroupMap>,
    key_locks: KeyLocks,
    // Read-held by each resolution, write-held by clear and rebuild: the
    // two never interleave.
    resolve_gate: RwLock<()>,
    // Held for a whole snapshot-and-write so a stale snapshot never lands
    // after a newer one.
    persist_lock: Mutex<()>,
}

impl<P: TabGroupPlatform, S: KeyValueStore> Reconciler<P, S> {
    pub fn new(platform: P, store: S, config: ReconcilerConfig) -> Self {
        Self {
            platform,
            store,
            config,
            cache: Mutex::new(TicketGroupMap::new()),
            key_locks: KeyLocks::new(),
            resolve_gate: RwLock::new(()),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Copy of the current cache.
    pub async fn cache_snapshot(&self) -> TicketGroupMap {
        self.cache.lock().await.clone()
    }

    /// Populate the cache from the store. A missing or unreadable map
    /// leaves the cache empty. Returns the number of entries loaded.
    pub async fn load(&self) -> usize {
        let key = &self.config.storage_key;
        let stored = match self.store.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(storage_key = %key, "failed to read ticket map, starting empty: {e}");
                return 0;
            }
        };
        let map = match TicketGroupMap::from_stored(stored) {
            Ok(m) => m,
            Err(e) => {
                warn!(storage_key = %key, "ignoring stored ticket map: {e}");
                return 0;
            }
        };
        let n = map.len();
        *self.cache.lock().await = map;
        debug!(entries = n, "ticket map loaded");
        n
    }

    /// Handle one tab update end to end.
    pub async fn handle_event(&self, event: &TabUpdateEvent) -> ReconcileOutcome {
        match extract_key(event, &self.config.gate) {
            Some(key) => self.reconcile(key, event.tab_id).await,
            None => {
                debug!(tab = %event.tab_id, "no classification key");
                ReconcileOutcome::Skipped { tab: event.tab_id }
            }
        }
    }

    /// Put `tab` in the group for `key`.
    pub async fn reconcile(&self, key: ClassificationKey, tab: TabId) -> ReconcileOutcome {
        let _gate = self.resolve_gate.read().await;
        let _key_guard = self.key_locks.acquire(key.group_title()).await;
        let result = if key.is_hotfix() {
            self.reconcile_hotfix(&key, tab).await
        } else {
            self.reconcile_ticket(&key, tab).await
        };
        result.unwrap_or_else(|e| {
            warn!(key = %key, tab = %tab, "reconcile failed: {e}");
            ReconcileOutcome::Failed {
                tab,
                key,
                reason: e.to_string(),
            }
        })
    }

    async fn reconcile_hotfix(
        &self,
        key: &ClassificationKey,
        tab: TabId,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self.find_live(HOTFIX_TITLE).await? {
            Some(group) => {
                self.move_and_expand(tab, group)
                    .await
                    .map_err(ReconcileError::Move)?;
                debug!(tab = %tab, group = %group, "joined hotfix group");
                Ok(ReconcileOutcome::Joined {
                    tab,
                    key: key.clone(),
                    group,
                    source: GroupSource::Live,
                })
            }
            None => self.create_group(key, tab).await,
        }
    }

    async fn reconcile_ticket(
        &self,
        key: &ClassificationKey,
        tab: TabId,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let title = key.group_title();
        let cached = self.cache.lock().await.get(title);

        let (group, source) = match cached {
            Some(group) => (group, GroupSource::Cache),
            None => match self.find_live(title).await? {
                Some(group) => {
                    info!(key = %key, group = %group, "adopting live group");
                    self.remember(title, group).await;
                    (group, GroupSource::Live)
                }
                None => return self.create_group(key, tab).await,
            },
        };

        match self.move_and_expand(tab, group).await {
            Ok(()) => {
                debug!(key = %key, tab = %tab, group = %group, ?source, "joined group");
                Ok(ReconcileOutcome::Joined {
                    tab,
                    key: key.clone(),
                    group,
                    source,
                })
            }
            // The tab went away; the group handle may still be good.
            Err(e @ PlatformError::InvalidTab(_)) => Err(ReconcileError::Move(e)),
            Err(e) => {
                warn!(
                    key = %key,
                    group = %group,
                    closed = e.is_stale_group(),
                    "move rejected, evicting cached group: {e}"
                );
                self.forget(title, group).await;
                Ok(ReconcileOutcome::Evicted {
                    tab,
                    key: key.clone(),
                    group,
                })
            }
        }
    }

    /// Make a new group from `tab`, title it after `key`, expand it, and
    /// cache it unless it is the hotfix group.
    async fn create_group(
        &self,
        key: &ClassificationKey,
        tab: TabId,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let title = key.group_title();
        let group = self
            .platform
            .create_group_from_tab(tab)
            .await
            .map_err(ReconcileError::Create)?;
        info!(key = %key, tab = %tab, group = %group, "created group");

        if let Err(e) = self
            .platform
            .set_group_properties(group, GroupProperties::titled(title))
            .await
        {
            warn!(key = %key, group = %group, "failed to title new group: {e}");
        }

        if !key.is_hotfix() {
            self.remember(title, group).await;
        }

        Ok(ReconcileOutcome::Created {
            tab,
            key: key.clone(),
            group,
        })
    }

    /// First live group titled exactly `title`.
    async fn find_live(&self, title: &str) -> Result<Option<GroupHandle>, ReconcileError> {
        let groups = self
            .platform
            .query_groups()
            .await
            .map_err(ReconcileError::Query)?;
        Ok(groups.into_iter().find(|g| g.has_title(title)).map(|g| g.id))
    }

    /// Move, then force expanded. Only the move decides success; a failed
    /// expand is logged.
    async fn move_and_expand(&self, tab: TabId, group: GroupHandle) -> Result<(), PlatformError> {
        self.platform.move_tab_to_group(tab, group).await?;
        if let Err(e) = self
            .platform
            .set_group_properties(group, GroupProperties::expanded())
            .await
        {
            warn!(group = %group, "failed to expand group: {e}");
        }
        Ok(())
    }

    async fn remember(&self, key: &str, group: GroupHandle) {
        self.cache.lock().await.insert(key, group);
        // Failures are logged inside persist.
        let _ = self.persist().await;
    }

    /// Drop `key` if it still points at `group`.
    async fn forget(&self, key: &str, group: GroupHandle) {
        {
            let mut cache = self.cache.lock().await;
            if cache.get(key) != Some(group) {
                return;
            }
            cache.remove(key);
        }
        let _ = self.persist().await;
    }

    /// Write the whole cache to the store, retrying with exponential
    /// backoff. The in-memory cache stays authoritative if every attempt
    /// fails.
    pub async fn persist(&self) -> Result<(), ReconcileError> {
        let _persist_guard = self.persist_lock.lock().await;
        let attempts = self.config.persist_attempts.max(1);
        let mut attempt = 1;
        loop {
            let (value, entries) = {
                let cache = self.cache.lock().await;
                (cache.to_storage_value(), cache.len())
            };
            match self.store.set(&self.config.storage_key, value).await {
                Ok(()) => {
                    debug!(entries, attempt, "ticket map persisted");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        entries,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "persisting ticket map failed: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(entries, attempt, "giving up persisting ticket map: {e}");
                    return Err(ReconcileError::Persist(e));
                }
            }
        }
    }

    /// Throw the cache away and rebuild it from live groups whose title is
    /// a ticket id. On query failure the cache is left untouched. Waits for
    /// in-flight resolutions to finish and holds off new ones meanwhile.
    pub async fn rebuild_from_live(&self) -> Result<usize, ReconcileError> {
        let _gate = self.resolve_gate.write().await;
        let groups = self
            .platform
            .query_groups()
            .await
            .map_err(ReconcileError::Query)?;

        let mut rebuilt = TicketGroupMap::new();
        for group in groups {
            let Some(title) = group.title.as_deref() else {
                continue;
            };
            if title == HOTFIX_TITLE || !is_ticket_id(title) {
                continue;
            }
            if rebuilt.get(title).is_none() {
                rebuilt.insert(title, group.id);
            }
        }

        let n = rebuilt.len();
        *self.cache.lock().await = rebuilt;
        info!(entries = n, "ticket map rebuilt from live groups");
        self.persist().await?;
        Ok(n)
    }

    /// Empty the cache and remove the stored map, once in-flight
    /// resolutions have finished.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _gate = self.resolve_gate.write().await;
        let _persist_guard = self.persist_lock.lock().await;
        self.cache.lock().await.clear();
        self.store.remove(&self.config.storage_key).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tabgroup_browser::{CallCounts, MemoryStore, Op, SimulatedBrowser};

    use super::*;

    const JIRA: &str = "https://acme.atlassian.net/browse/ABC-123";

    type TestReconciler = Reconciler<Arc<SimulatedBrowser>, Arc<MemoryStore>>;

    fn setup() -> (Arc<SimulatedBrowser>, Arc<MemoryStore>, TestReconciler) {
        setup_with(SimulatedBrowser::new(), MemoryStore::new())
    }

    fn setup_with(
        browser: SimulatedBrowser,
        store: MemoryStore,
    ) -> (Arc<SimulatedBrowser>, Arc<MemoryStore>, TestReconciler) {
        let browser = Arc::new(browser);
        let store = Arc::new(store);
        let config = ReconcilerConfig {
            persist_backoff: Duration::from_millis(1),
            ..ReconcilerConfig::default()
        };
        let r = Reconciler::new(Arc::clone(&browser), Arc::clone(&store), config);
        (browser, store, r)
    }

    fn ticket(id: &str) -> ClassificationKey {
        ClassificationKey::Ticket(id.into())
    }

    fn stored_map(store: &MemoryStore) -> TicketGroupMap {
        TicketGroupMap::from_stored(store.peek("ticketGroupMap")).expect("decodes")
    }

    // ── Ticket path ────────────────────────────────────────────────

    #[tokio::test]
    async fn new_ticket_creates_titled_expanded_group_and_caches_it() {
        let (browser, store, r) = setup();
        let ev = TabUpdateEvent::new(1, Some("[ABC-123] Fix login bug"), JIRA);

        let outcome = r.handle_event(&ev).await;

        let ReconcileOutcome::Created { group, key, .. } = outcome else {
            panic!("expected Created, got {outcome:?}");
        };
        assert_eq!(key, ticket("ABC-123"));
        let live = browser.group(group).expect("group exists");
        assert_eq!(live.title.as_deref(), Some("ABC-123"));
        assert!(!live.collapsed);
        assert_eq!(browser.group_of(TabId(1)), Some(group));
        assert_eq!(r.cache_snapshot().await.get("ABC-123"), Some(group));
        assert_eq!(stored_map(&store).get("ABC-123"), Some(group));
    }

    #[tokio::test]
    async fn cached_handle_moves_without_query_or_create() {
        let (browser, _store, r) = setup();
        r.handle_event(&TabUpdateEvent::new(1, Some("ABC-123 one"), JIRA))
            .await;
        browser.reset_calls();

        let outcome = r
            .handle_event(&TabUpdateEvent::new(2, Some("ABC-123 two"), JIRA))
            .await;

        assert_eq!(outcome.group(), browser.group_of(TabId(1)));
        assert!(matches!(
            outcome,
            ReconcileOutcome::Joined {
                source: GroupSource::Cache,
                ..
            }
        ));
        assert_eq!(
            browser.calls(),
            CallCounts {
                query_groups: 0,
                create_group: 0,
                move_tab: 1,
                set_properties: 1,
            }
        );
    }

    #[tokio::test]
    async fn repeat_resolution_is_one_move_and_expand_each_time() {
        let (browser, _store, r) = setup();
        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        browser.reset_calls();

        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        r.reconcile(ticket("ABC-1"), TabId(1)).await;

        let calls = browser.calls();
        assert_eq!(calls.move_tab, 2);
        assert_eq!(calls.set_properties, 2);
        assert_eq!(calls.create_group + calls.query_groups, 0);
    }

    #[tokio::test]
    async fn live_group_with_key_title_is_adopted() {
        let (browser, store, r) = setup();
        let existing = browser.seed_group("ABC-123", &[TabId(9)]);
        browser.collapse_group(existing);

        let outcome = r.reconcile(ticket("ABC-123"), TabId(1)).await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Joined {
                tab: TabId(1),
                key: ticket("ABC-123"),
                group: existing,
                source: GroupSource::Live,
            }
        );
        assert!(!browser.group(existing).expect("live").collapsed);
        assert_eq!(stored_map(&store).get("ABC-123"), Some(existing));
        assert_eq!(browser.calls().create_group, 0);
    }

    #[tokio::test]
    async fn stale_cached_handle_is_evicted_and_persisted() {
        let (browser, store, r) = setup();
        let ReconcileOutcome::Created { group: g3, .. } =
            r.reconcile(ticket("ABC-123"), TabId(1)).await
        else {
            panic!("expected Created");
        };
        assert!(browser.close_group(g3));

        let outcome = r.reconcile(ticket("ABC-123"), TabId(2)).await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Evicted {
                tab: TabId(2),
                key: ticket("ABC-123"),
                group: g3,
            }
        );
        assert_eq!(r.cache_snapshot().await.get("ABC-123"), None);
        assert_eq!(stored_map(&store).get("ABC-123"), None);
        assert_eq!(browser.group_of(TabId(2)), None);
    }

    #[tokio::test]
    async fn after_eviction_next_event_recreates() {
        let (browser, _store, r) = setup();
        let first = r.reconcile(ticket("ABC-1"), TabId(1)).await;
        browser.close_group(first.group().expect("created"));
        r.reconcile(ticket("ABC-1"), TabId(2)).await;

        let outcome = r.reconcile(ticket("ABC-1"), TabId(2)).await;

        let ReconcileOutcome::Created { group, .. } = outcome else {
            panic!("expected Created, got {outcome:?}");
        };
        assert_ne!(Some(group), first.group());
        assert_eq!(r.cache_snapshot().await.get("ABC-1"), Some(group));
    }

    #[tokio::test]
    async fn rejected_move_to_adopted_group_evicts_it() {
        let (browser, store, r) = setup();
        let g = browser.seed_group("ABC-7", &[TabId(9)]);
        browser.fail_next(Op::MoveTab, 1);

        let outcome = r.reconcile(ticket("ABC-7"), TabId(1)).await;

        assert!(matches!(outcome, ReconcileOutcome::Evicted { group, .. } if group == g));
        assert!(stored_map(&store).is_empty());
    }

    #[tokio::test]
    async fn closed_tab_does_not_evict_group() {
        let (browser, _store, r) = setup();
        let created = r.reconcile(ticket("ABC-1"), TabId(1)).await;
        browser.close_tab(TabId(2));

        let outcome = r.reconcile(ticket("ABC-1"), TabId(2)).await;

        assert!(matches!(outcome, ReconcileOutcome::Failed { .. }));
        assert_eq!(r.cache_snapshot().await.get("ABC-1"), created.group());
    }

    #[tokio::test]
    async fn query_failure_is_reported_not_cached() {
        let (browser, store, r) = setup();
        browser.fail_next(Op::QueryGroups, 1);

        let outcome = r.reconcile(ticket("ABC-1"), TabId(1)).await;

        assert!(matches!(outcome, ReconcileOutcome::Failed { .. }));
        assert_eq!(browser.calls().create_group, 0);
        assert_eq!(store.set_calls(), 0);
    }

    #[tokio::test]
    async fn failed_expand_still_counts_as_joined() {
        let (browser, _store, r) = setup();
        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        browser.fail_next(Op::SetProperties, 1);

        let outcome = r.reconcile(ticket("ABC-1"), TabId(2)).await;

        assert!(matches!(outcome, ReconcileOutcome::Joined { .. }));
    }

    #[tokio::test]
    async fn issue_key_from_url_is_grouped() {
        let (browser, _store, r) = setup();
        let ev = TabUpdateEvent::new(
            4,
            Some("Board"),
            "https://acme.atlassian.net/jira/boards/1?issueKey=XYZ-1",
        );

        let outcome = r.handle_event(&ev).await;

        let group = outcome.group().expect("grouped");
        assert_eq!(
            browser.group(group).expect("live").title.as_deref(),
            Some("XYZ-1")
        );
    }

    #[tokio::test]
    async fn ungated_event_is_skipped_without_platform_calls() {
        let (browser, _store, r) = setup();
        let ev = TabUpdateEvent::new(1, Some("ABC-1"), "https://example.com/");

        assert_eq!(
            r.handle_event(&ev).await,
            ReconcileOutcome::Skipped { tab: TabId(1) }
        );
        assert_eq!(browser.calls(), CallCounts::default());
    }

    // ── Hotfix path ────────────────────────────────────────────────

    #[tokio::test]
    async fn hotfix_joins_live_group_and_leaves_cache_alone() {
        let (browser, store, r) = setup();
        let g7 = browser.seed_group("Hotfix", &[TabId(70)]);
        browser.collapse_group(g7);
        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        let before = r.cache_snapshot().await;
        let writes = store.set_calls();

        let ev = TabUpdateEvent::new(2, Some("Hotfix: payment outage"), JIRA);
        let outcome = r.handle_event(&ev).await;

        assert_eq!(outcome.group(), Some(g7));
        assert_eq!(browser.group_of(TabId(2)), Some(g7));
        assert!(!browser.group(g7).expect("live").collapsed);
        assert_eq!(r.cache_snapshot().await, before);
        assert_eq!(store.set_calls(), writes);
    }

    #[tokio::test]
    async fn hotfix_without_live_group_creates_one_uncached() {
        let (browser, store, r) = setup();

        let outcome = r.reconcile(ClassificationKey::Hotfix, TabId(5)).await;

        let ReconcileOutcome::Created { group, .. } = outcome else {
            panic!("expected Created, got {outcome:?}");
        };
        assert_eq!(
            browser.group(group).expect("live").title.as_deref(),
            Some("Hotfix")
        );
        assert!(r.cache_snapshot().await.is_empty());
        assert_eq!(store.set_calls(), 0);
    }

    #[tokio::test]
    async fn hotfix_move_failure_is_reported_and_cache_untouched() {
        let (browser, store, r) = setup();
        let g7 = browser.seed_group("Hotfix", &[TabId(70)]);
        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        let before = r.cache_snapshot().await;
        let writes = store.set_calls();
        browser.fail_next(Op::MoveTab, 1);

        let outcome = r.reconcile(ClassificationKey::Hotfix, TabId(2)).await;

        assert!(
            matches!(outcome, ReconcileOutcome::Failed { ref key, .. } if key.is_hotfix()),
            "got {outcome:?}"
        );
        assert_eq!(browser.group_of(TabId(2)), None);
        assert!(browser.group(g7).is_some());
        assert_eq!(r.cache_snapshot().await, before);
        assert_eq!(store.set_calls(), writes);
    }

    #[tokio::test]
    async fn hotfix_always_queries_live_groups() {
        let (browser, _store, r) = setup();
        r.reconcile(ClassificationKey::Hotfix, TabId(1)).await;
        r.reconcile(ClassificationKey::Hotfix, TabId(2)).await;

        let calls = browser.calls();
        assert_eq!(calls.query_groups, 2);
        assert_eq!(calls.create_group, 1);
        assert_eq!(browser.groups().len(), 1);
    }

    // ── Concurrency ────────────────────────────────────────────────

    #[tokio::test]
    async fn concurrent_events_for_same_new_key_create_one_group() {
        let (browser, _store, r) = setup_with(
            SimulatedBrowser::new().with_latency(Duration::from_millis(5)),
            MemoryStore::new(),
        );
        let r = Arc::new(r);

        let handles: Vec<_> = (1..=4)
            .map(|tab| {
                let r = Arc::clone(&r);
                tokio::spawn(async move { r.reconcile(ticket("ABC-9"), TabId(tab)).await })
            })
            .collect();
        for h in handles {
            h.await.expect("task");
        }

        assert_eq!(browser.calls().create_group, 1);
        assert_eq!(browser.groups().len(), 1);
        assert_eq!(browser.groups()[0].tabs.len(), 4);
    }

    #[tokio::test]
    async fn concurrent_hotfix_events_create_one_group() {
        let (browser, _store, r) = setup_with(
            SimulatedBrowser::new().with_latency(Duration::from_millis(5)),
            MemoryStore::new(),
        );
        let r = Arc::new(r);

        let a = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.reconcile(ClassificationKey::Hotfix, TabId(1)).await }
        });
        let b = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.reconcile(ClassificationKey::Hotfix, TabId(2)).await }
        });
        a.await.expect("task");
        b.await.expect("task");

        assert_eq!(browser.calls().create_group, 1);
    }

    #[tokio::test]
    async fn hotfix_sentinel_and_hotfix_ticket_create_one_group() {
        let (browser, _store, r) = setup_with(
            SimulatedBrowser::new().with_latency(Duration::from_millis(5)),
            MemoryStore::new(),
        );
        let r = Arc::new(r);

        let a = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.reconcile(ClassificationKey::Hotfix, TabId(1)).await }
        });
        let b = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.reconcile(ticket("Hotfix"), TabId(2)).await }
        });
        a.await.expect("task");
        b.await.expect("task");

        assert_eq!(browser.calls().create_group, 1);
        let groups = browser.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title.as_deref(), Some("Hotfix"));
        assert_eq!(groups[0].tabs.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_distinct_keys_all_persist() {
        let (_browser, store, r) = setup_with(
            SimulatedBrowser::new().with_latency(Duration::from_millis(2)),
            MemoryStore::new(),
        );
        let r = Arc::new(r);

        let handles: Vec<_> = ["A-1", "B-2", "C-3", "D-4"]
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let r = Arc::clone(&r);
                tokio::spawn(async move { r.reconcile(ticket(id), TabId(i as i64)).await })
            })
            .collect();
        for h in handles {
            h.await.expect("task");
        }

        assert_eq!(stored_map(&store).len(), 4);
    }

    // ── Persistence ────────────────────────────────────────────────

    #[tokio::test]
    async fn load_reads_stored_pairs() {
        let (_browser, _store, r) = setup_with(
            SimulatedBrowser::new(),
            MemoryStore::with_value("ticketGroupMap", json!([["ABC-1", 3], ["XYZ-2", 8]])),
        );

        assert_eq!(r.load().await, 2);
        assert_eq!(r.cache_snapshot().await.get("XYZ-2"), Some(GroupHandle(8)));
    }

    #[tokio::test]
    async fn load_ignores_malformed_map() {
        let (_browser, _store, r) = setup_with(
            SimulatedBrowser::new(),
            MemoryStore::with_value("ticketGroupMap", json!({"ABC-1": 3})),
        );

        assert_eq!(r.load().await, 0);
        assert!(r.cache_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn loaded_stale_entry_is_evicted_on_use() {
        let (browser, store, r) = setup_with(
            SimulatedBrowser::new(),
            MemoryStore::with_value("ticketGroupMap", json!([["ABC-123", 3]])),
        );
        r.load().await;

        let outcome = r.reconcile(ticket("ABC-123"), TabId(1)).await;

        assert!(matches!(outcome, ReconcileOutcome::Evicted { .. }));
        assert!(stored_map(&store).is_empty());
        assert_eq!(browser.calls().create_group, 0);
    }

    #[tokio::test]
    async fn persist_retries_until_store_accepts() {
        let (_browser, store, r) = setup();
        store.fail_next_sets(2);

        r.reconcile(ticket("ABC-1"), TabId(1)).await;

        assert_eq!(store.set_calls(), 3);
        assert_eq!(stored_map(&store).len(), 1);
    }

    #[tokio::test]
    async fn persist_gives_up_after_configured_attempts() {
        let (_browser, store, r) = setup();
        store.fail_next_sets(6);

        let outcome = r.reconcile(ticket("ABC-1"), TabId(1)).await;

        assert!(matches!(outcome, ReconcileOutcome::Created { .. }));
        assert_eq!(store.set_calls(), 3);
        assert_eq!(store.peek("ticketGroupMap"), None);
        assert_eq!(r.cache_snapshot().await.len(), 1);
        assert!(matches!(
            r.persist().await,
            Err(ReconcileError::Persist(_))
        ));
    }

    #[tokio::test]
    async fn persisted_map_round_trips_through_a_fresh_reconciler() {
        let (browser, store, r) = setup();
        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        r.reconcile(ticket("XYZ-2"), TabId(2)).await;

        let fresh = Reconciler::new(
            Arc::clone(&browser),
            Arc::clone(&store),
            ReconcilerConfig::default(),
        );
        fresh.load().await;

        assert_eq!(fresh.cache_snapshot().await, r.cache_snapshot().await);
    }

    // ── Rebuild / clear ────────────────────────────────────────────

    #[tokio::test]
    async fn rebuild_adopts_ticket_titled_groups_only() {
        let (browser, store, r) = setup_with(
            SimulatedBrowser::new(),
            MemoryStore::with_value("ticketGroupMap", json!([["OLD-1", 99]])),
        );
        r.load().await;
        let a = browser.seed_group("ABC-1", &[TabId(1)]);
        browser.seed_group("Hotfix", &[TabId(2)]);
        browser.seed_group("Research", &[TabId(3)]);
        browser.seed_group("ABC-1", &[TabId(4)]);

        assert_eq!(r.rebuild_from_live().await.expect("rebuild"), 1);

        let cache = r.cache_snapshot().await;
        assert_eq!(cache.get("ABC-1"), Some(a));
        assert_eq!(cache.get("OLD-1"), None);
        assert_eq!(stored_map(&store), cache);
    }

    #[tokio::test]
    async fn rebuild_query_failure_keeps_cache() {
        let (browser, _store, r) = setup();
        r.reconcile(ticket("ABC-1"), TabId(1)).await;
        browser.fail_next(Op::QueryGroups, 1);

        assert!(r.rebuild_from_live().await.is_err());
        assert_eq!(r.cache_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_waits_for_in_flight_resolution() {
        let (browser, store, r) = setup_with(
            SimulatedBrowser::new().with_latency(Duration::from_millis(5)),
            MemoryStore::new(),
        );
        let r = Arc::new(r);

        let pending = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.reconcile(ticket("ABC-1"), TabId(1)).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        r.clear().await.expect("clear");
        let outcome = pending.await.expect("task");

        assert!(matches!(outcome, ReconcileOutcome::Created { .. }));
        assert_eq!(browser.groups().len(), 1);
        assert!(r.cache_snapshot().await.is_empty());
        assert_eq!(store.peek("ticketGroupMap"), None);
    }

    #[tokio::test]
    async fn rebuild_waits_for_in_flight_resolution() {
        let (browser, store, r) = setup_with(
            SimulatedBrowser::new().with_latency(Duration::from_millis(5)),
            MemoryStore::new(),
        );
        let r = Arc::new(r);
        browser.seed_group("OPS-2", &[TabId(20)]);

        let pending = tokio::spawn({
            let r = Arc::clone(&r);
            async move { r.reconcile(ticket("ABC-1"), TabId(1)).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(r.rebuild_from_live().await.expect("rebuild"), 2);
        pending.await.expect("task");

        let cache = r.cache_snapshot().await;
        assert_eq!(cache.len(), 2);
        assert!(cache.get("ABC-1").is_some());
        assert_eq!(stored_map(&store), cache);
    }

    #[tokio::test]
    async fn clear_empties_cache_and_store() {
        let (_browser, store, r) = setup();
        r.reconcile(ticket("ABC-1"), TabId(1)).await;

        r.clear().await.expect("clear");

        assert!(r.cache_snapshot().await.is_empty());
        assert_eq!(store.peek("ticketGroupMap"), None);
    }
}
