//! TOML config file for the runtime binary.
//!
//! Every key is optional; a missing file means built-in defaults.
//!
//! ```toml
//! allowed_domains = ["bitbucket.org", "atlassian.net"]
//! storage_key = "ticketGroupMap"
//! persist_attempts = 3
//! persist_backoff_ms = 50
//! store_path = "/var/lib/tabgroup/store.json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tabgroup_core::key::DEFAULT_ALLOWED_DOMAINS;
use tabgroup_core::{DomainGate, STORAGE_KEY};
use tabgroup_reconciler::ReconcilerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub allowed_domains: Vec<String>,
    pub storage_key: String,
    pub persist_attempts: u32,
    pub persist_backoff_ms: u64,
    pub store_path: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            storage_key: STORAGE_KEY.to_string(),
            persist_attempts: 3,
            persist_backoff_ms: 50,
            store_path: None,
        }
    }
}

impl FileConfig {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        if cfg.storage_key.trim().is_empty() {
            anyhow::bail!("storage_key must not be empty");
        }
        Ok(cfg)
    }

    /// Read `path`. A missing file yields defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("cannot read config {}", path.display())),
        }
    }

    /// `domains` replaces the configured list when non-empty.
    pub fn reconciler_config(&self, domains: &[String]) -> ReconcilerConfig {
        let gate = if domains.is_empty() {
            DomainGate::new(&self.allowed_domains)
        } else {
            DomainGate::new(domains)
        };
        ReconcilerConfig {
            gate,
            storage_key: self.storage_key.clone(),
            persist_attempts: self.persist_attempts.max(1),
            persist_backoff: Duration::from_millis(self.persist_backoff_ms),
        }
    }
}
