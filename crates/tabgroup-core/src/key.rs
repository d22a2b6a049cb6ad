//! Classification key extraction.
//!
//! Maps a tab update to the group it belongs in:
//!
//! 1. Gate: the tab URL must be on an allowed work-tracking domain.
//! 2. A new title containing `hotfix` (any case) wins outright.
//! 3. Otherwise the first `[A-Z]+-[0-9]+` in the new title.
//! 4. Otherwise the `issueKey` query parameter of the URL.
//!
//! Pure: no IO, no clock, no state.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::TabUpdateEvent;

/// Title of the shared hotfix group.
pub const HOTFIX_TITLE: &str = "Hotfix";

/// Query parameter consulted when the title carries no ticket id.
pub const ISSUE_KEY_PARAM: &str = "issueKey";

/// Domains gated in when no explicit list is configured.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["bitbucket.org", "atlassian.net"];

static TICKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]+-[0-9]+").expect("ticket pattern is valid"));

static TICKET_EXACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+-[0-9]+$").expect("ticket pattern is valid"));

// ─── Key ──────────────────────────────────────────────────────────

/// The group a tab should join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKey {
    /// The single, name-addressed hotfix group.
    Hotfix,
    /// A ticket id from the title, or the raw `issueKey` value from the URL.
    Ticket(String),
}

impl ClassificationKey {
    /// Title the group carries on the platform.
    pub fn group_title(&self) -> &str {
        match self {
            Self::Hotfix => HOTFIX_TITLE,
            Self::Ticket(id) => id,
        }
    }

    pub fn is_hotfix(&self) -> bool {
        matches!(self, Self::Hotfix)
    }
}

impl fmt::Display for ClassificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group_title())
    }
}

// ─── Domain gate ──────────────────────────────────────────────────

/// Set of hosts whose tabs are eligible for grouping.
///
/// A URL passes when its host equals an allowed domain or is a subdomain
/// of one (`acme.atlassian.net` passes for `atlassian.net`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGate {
    domains: Vec<String>,
}

impl DomainGate {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn allows(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

impl Default for DomainGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_DOMAINS)
    }
}

// ─── Extraction ───────────────────────────────────────────────────

/// Derive the classification key for a tab update, or `None` when the tab
/// should be left alone.
pub fn extract_key(event: &TabUpdateEvent, gate: &DomainGate) -> Option<ClassificationKey> {
    let title = event.title();
    let url = event.url();

    if (title.is_none() && url.is_empty()) || !gate.allows(url) {
        return None;
    }

    if title.is_some_and(|t| t.to_lowercase().contains("hotfix")) {
        return Some(ClassificationKey::Hotfix);
    }

    title
        .and_then(ticket_in_title)
        .or_else(|| issue_key_param(url))
        .map(ClassificationKey::Ticket)
}

/// First ticket id appearing anywhere in `title`.
pub fn ticket_in_title(title: &str) -> Option<String> {
    TICKET_RE.find(title).map(|m| m.as_str().to_string())
}

/// Value of the `issueKey` query parameter. Empty values count as absent.
pub fn issue_key_param(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(name, _)| name == ISSUE_KEY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Whether `s` is exactly one ticket id (used when adopting live groups).
pub fn is_ticket_id(s: &str) -> bool {
    TICKET_EXACT_RE.is_match(s)
}
