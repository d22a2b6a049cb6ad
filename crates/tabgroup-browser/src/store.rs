//! KeyValueStore trait and two implementations.
//!
//! Semantics follow the browser's local storage area: async, whole-value
//! writes, last write wins, no transactions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, Value>,
    failing_sets: usize,
    sets: usize,
}

/// Process-local store. Can be told to fail upcoming writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one entry.
    pub fn with_value(key: &str, value: Value) -> Self {
        let store = Self::new();
        store.lock().values.insert(key.to_string(), value);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `times` calls to `set`.
    pub fn fail_next_sets(&self, times: usize) {
        self.lock().failing_sets += times;
    }

    /// Synchronous read for assertions.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    /// Number of `set` calls, failed ones included.
    pub fn set_calls(&self) -> usize {
        self.lock().sets
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.sets += 1;
        if inner.failing_sets > 0 {
            inner.failing_sets -= 1;
            return Err(StoreError::Unavailable(format!("write of {key} refused")));
        }
        inner.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().values.remove(key);
        Ok(())
    }
}

// ─── JsonFileStore ────────────────────────────────────────────────

/// All keys in one JSON object file. Writes replace the file atomically
/// (temp file + rename) so a crash never leaves half a document behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_all(&self, doc: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), keys = doc.len(), "store written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_all().await?;
        doc.insert(key.to_string(), value);
        self.write_all(&doc).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_all().await?;
        if doc.remove(key).is_some() {
            self.write_all(&doc).await?;
        }
        Ok(())
    }
}
