//! tabgroup-reconciler: ticket → group reconciliation engine.
//! Resolves a classification key to a live group (cache, then live
//! groups, then create), moves the tab in, and keeps the persisted
//! ticket map in step with what the browser actually holds.

pub mod config;
pub mod error;
pub mod key_lock;
pub mod outcome;
pub mod reconciler;

pub use config::ReconcilerConfig;
pub use error::ReconcileError;
pub use outcome::{GroupSource, ReconcileOutcome};
pub use reconciler::Reconciler;
