//! Event stream: newline-delimited JSON messages applied to a simulated
//! browser and a reconciler.
//!
//! Tab updates are reconciled concurrently, each in its own task, the way
//! the browser fires listeners without waiting for the previous one. Every
//! other message mutates the browser (or the reconciler) in line order.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabgroup_browser::{CallCounts, KeyValueStore, SimGroup, SimulatedBrowser};
use tabgroup_core::{GroupHandle, TabId, TabUpdateEvent};
use tabgroup_reconciler::{ReconcileOutcome, Reconciler};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;

pub type SimReconciler<S> = Reconciler<Arc<SimulatedBrowser>, S>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamMessage {
    /// A tab finished loading or changed title.
    TabUpdated(TabUpdateEvent),
    /// The user groups a tab by hand.
    SeedGroup { tab_id: TabId, title: String },
    CloseGroup { group_id: GroupHandle },
    RenameGroup { group_id: GroupHandle, title: String },
    CloseTab { tab_id: TabId },
    /// Rebuild the ticket map from live group titles.
    Rebuild,
    /// Forget every mapping, in memory and in the store.
    ClearMap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    pub skipped: usize,
    pub joined: usize,
    pub created: usize,
    pub evicted: usize,
    pub failed: usize,
}

impl OutcomeTally {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Skipped { .. } => self.skipped += 1,
            ReconcileOutcome::Joined { .. } => self.joined += 1,
            ReconcileOutcome::Created { .. } => self.created += 1,
            ReconcileOutcome::Evicted { .. } => self.evicted += 1,
            ReconcileOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Printed once the stream ends and every reconcile task has finished.
#[derive(Debug, Serialize)]
pub struct StreamSummary {
    pub generated_at: DateTime<Utc>,
    pub messages: usize,
    pub bad_lines: usize,
    pub interrupted: bool,
    pub outcomes: OutcomeTally,
    pub groups: Vec<SimGroup>,
    pub cache: BTreeMap<String, GroupHandle>,
    pub calls: CallCounts,
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<Result<StreamMessage, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

fn emit<W: Write>(out: &mut W, outcome: &ReconcileOutcome) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, outcome)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Apply every message from `reader`, writing one JSON line per reconcile
/// outcome to `out` as tasks finish. Stops early on ctrl-c.
pub async fn run_stream<S, R, W>(
    reconciler: Arc<SimReconciler<S>>,
    reader: R,
    out: &mut W,
) -> anyhow::Result<StreamSummary>
where
    S: KeyValueStore + 'static,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    let mut tasks: JoinSet<ReconcileOutcome> = JoinSet::new();
    let mut tally = OutcomeTally::default();
    let mut messages = 0;
    let mut bad_lines = 0;
    let mut line_no = 0usize;
    let mut interrupted = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut ctrl_c => {
                tracing::info!("received ctrl-c, draining in-flight updates");
                interrupted = true;
                break;
            }
        };
        let Some(line) = line else { break };
        line_no += 1;

        let msg = match parse_line(&line) {
            None => continue,
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::warn!(line = line_no, "skipping malformed message: {e}");
                bad_lines += 1;
                continue;
            }
        };
        messages += 1;
        apply(&reconciler, &mut tasks, msg).await;

        while let Some(done) = tasks.try_join_next() {
            let outcome = done?;
            tally.record(&outcome);
            emit(out, &outcome)?;
        }
    }

    while let Some(done) = tasks.join_next().await {
        let outcome = done?;
        tally.record(&outcome);
        emit(out, &outcome)?;
    }

    let browser = reconciler.platform();
    let cache = reconciler
        .cache_snapshot()
        .await
        .iter()
        .map(|(k, g)| (k.to_string(), g))
        .collect();
    Ok(StreamSummary {
        generated_at: Utc::now(),
        messages,
        bad_lines,
        interrupted,
        outcomes: tally,
        groups: browser.groups(),
        cache,
        calls: browser.calls(),
    })
}

async fn apply<S>(
    reconciler: &Arc<SimReconciler<S>>,
    tasks: &mut JoinSet<ReconcileOutcome>,
    msg: StreamMessage,
) where
    S: KeyValueStore + 'static,
{
    let browser = reconciler.platform();
    match msg {
        StreamMessage::TabUpdated(event) => {
            let reconciler = Arc::clone(reconciler);
            tasks.spawn(async move { reconciler.handle_event(&event).await });
        }
        StreamMessage::SeedGroup { tab_id, title } => {
            let group = browser.seed_group(&title, &[tab_id]);
            tracing::debug!(%tab_id, %group, title = %title, "group seeded");
        }
        StreamMessage::CloseGroup { group_id } => {
            if !browser.close_group(group_id) {
                tracing::warn!(group = %group_id, "close_group: no such group");
            }
        }
        StreamMessage::RenameGroup { group_id, title } => {
            if !browser.rename_group(group_id, &title) {
                tracing::warn!(group = %group_id, "rename_group: no such group");
            }
        }
        StreamMessage::CloseTab { tab_id } => browser.close_tab(tab_id),
        StreamMessage::Rebuild => {
            if let Err(e) = reconciler.rebuild_from_live().await {
                tracing::error!("rebuild failed: {e}");
            }
        }
        StreamMessage::ClearMap => {
            if let Err(e) = reconciler.clear().await {
                tracing::error!("clearing ticket map failed: {e}");
            }
        }
    }
}
