//! Pluggable persistence (SPEC_FULL.md §1.1, component A4).
//!
//! Mirrors this crate's message routing layer's storage seam: an
//! `async_trait` the coordinator and facets program against, with no
//! concrete database driver shipped here. A production deployment supplies
//! its own `StorageBackend` (a SQL table, an object store, whatever fits);
//! this crate ships only [`InMemoryStorage`], useful for tests and for
//! development presets that don't need durability.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::StorageError;

/// Durable key/value storage for subsystem and facet state that must
/// survive a process restart (subsystem registry snapshots, channel
/// membership, kernel resource metadata).
///
/// Keys are opaque strings; callers namespace them (e.g.
/// `"<subsystem>/<facet-kind>"`) the way [`crate::message::MessagePath`]
/// namespaces routes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Writes `value` under `key`, replacing any existing value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Reads the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Removes `key`. Idempotent: removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Lists every stored key beginning with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// An in-process [`StorageBackend`] backed by a [`DashMap`], for tests and
/// non-durable development use. Nothing written here survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: DashMap<String, Value>,
}

impl InMemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

/// A [`StorageBackend`] that always fails with [`StorageError::Unavailable`],
/// for exercising a subsystem's error handling when persistence is down.
#[derive(Debug, Default)]
pub struct UnavailableStorage {
    /// Every call records the key it was invoked with, for test assertions.
    calls: Mutex<Vec<String>>,
}

impl UnavailableStorage {
    /// Creates a backend that rejects every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The keys every rejected call was invoked with, in order.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().expect("storage call log is not poisoned").clone()
    }

    fn record(&self, key: &str) {
        self.calls
            .lock()
            .expect("storage call log is not poisoned")
            .push(key.to_string());
    }
}

#[async_trait]
impl StorageBackend for UnavailableStorage {
    async fn put(&self, key: &str, _value: Value) -> Result<(), StorageError> {
        self.record(key);
        Err(StorageError::Unavailable {
            reason: "storage backend not configured".to_string(),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.record(key);
        Err(StorageError::Unavailable {
            reason: "storage backend not configured".to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.record(key);
        Err(StorageError::Unavailable {
            reason: "storage backend not configured".to_string(),
        })
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.record(prefix);
        Err(StorageError::Unavailable {
            reason: "storage backend not configured".to_string(),
        })
    }
}

/// Snapshots a subsystem's facet configuration map as a flat `"kind"` ->
/// `Value` table, the shape [`InMemoryStorage`] and any real backend store
/// it under `"<subsystem>/facets"`.
#[must_use]
pub fn facet_snapshot(facets: &HashMap<String, Value>) -> Value {
    Value::Object(facets.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_storage_round_trips_a_value() {
        let storage = InMemoryStorage::new();
        storage.put("canvas/facets", json!({"color": "red"})).await.unwrap();
        let value = storage.get("canvas/facets").await.unwrap();
        assert_eq!(value, Some(json!({"color": "red"})));
    }

    #[tokio::test]
    async fn in_memory_storage_get_of_absent_key_is_none() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_storage_delete_is_idempotent() {
        let storage = InMemoryStorage::new();
        storage.delete("missing").await.unwrap();
        storage.put("a", json!(1)).await.unwrap();
        storage.delete("a").await.unwrap();
        storage.delete("a").await.unwrap();
        assert_eq!(storage.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_storage_lists_keys_by_prefix() {
        let storage = InMemoryStorage::new();
        storage.put("canvas/facets", json!(1)).await.unwrap();
        storage.put("canvas/queue", json!(2)).await.unwrap();
        storage.put("kernel/pkr", json!(3)).await.unwrap();

        let mut keys = storage.list_keys("canvas/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["canvas/facets".to_string(), "canvas/queue".to_string()]);
    }

    #[tokio::test]
    async fn unavailable_storage_rejects_every_call_and_records_it() {
        let storage = UnavailableStorage::new();
        assert!(storage.put("a", json!(1)).await.is_err());
        assert!(storage.get("b").await.is_err());
        assert_eq!(storage.recorded_calls(), vec!["a".to_string(), "b".to_string()]);
    }
}
