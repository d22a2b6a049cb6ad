use std::time::Duration;

use tabgroup_core::{DomainGate, STORAGE_KEY};

/// Knobs for the reconciler. `Default` matches the browser extension.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Hosts whose tabs are grouped.
    pub gate: DomainGate,
    /// Store key holding the ticket map.
    pub storage_key: String,
    /// Total write attempts per persist, first one included. Minimum 1.
    pub persist_attempts: u32,
    /// Delay before the first retry; doubles each further retry.
    pub persist_backoff: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            gate: DomainGate::default(),
            storage_key: STORAGE_KEY.to_string(),
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(50),
        }
    }
}

impl ReconcilerConfig {
    /// Backoff before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.persist_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1).min(10)))
    }
}
