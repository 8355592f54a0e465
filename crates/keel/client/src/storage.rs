//! Storage backend abstraction and in-memory implementation
//!
//! Keys are hierarchical strings (`/registry/pods/default/web`). Every write
//! bumps a backend-wide index which becomes the entry's version; updates may
//! carry the version they were read at for optimistic concurrency.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A value read from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub key: String,
    pub value: Value,
    pub version: u64,
}

/// Persistent store used by the API server and the cluster client.
#[async_trait]
pub trait StorageBackend: fmt::Debug + Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<StoredValue>>;

    /// All live entries whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<StoredValue>>;

    /// Fails with `KeyExists` if the key is live.
    async fn create(&self, key: &str, value: Value, ttl: Option<Duration>) -> StorageResult<u64>;

    /// Fails with `VersionConflict` when `expected_version` is given and stale.
    async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<u64>;

    async fn delete(&self, key: &str) -> StorageResult<bool>;
}

#[derive(Debug)]
struct Entry {
    value: Value,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Table {
    entries: BTreeMap<String, Entry>,
    next_expiry: Option<Instant>,
}

impl Table {
    /// Drops expired entries once the earliest deadline has passed.
    fn sweep(&mut self, now: Instant) -> usize {
        if !self.next_expiry.is_some_and(|at| at <= now) {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        self.next_expiry = self.entries.values().filter_map(|e| e.expires_at).min();
        before - self.entries.len()
    }

    fn track(&mut self, expires_at: Option<Instant>) {
        if let Some(at) = expires_at {
            self.next_expiry = Some(self.next_expiry.map_or(at, |next| next.min(at)));
        }
    }
}

/// In-memory backend for single-process clusters and tests.
///
/// Expired entries are invisible to reads and are reclaimed by the next write
/// after their deadline.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    table: RwLock<Table>,
    index: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Drops expired entries without waiting for a write.
    pub async fn purge_expired(&self) -> usize {
        let removed = self.table.write().await.sweep(Instant::now());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired entries");
        }
        removed
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<StoredValue>> {
        let now = Instant::now();
        let table = self.table.read().await;
        Ok(table
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| StoredValue {
                key: key.to_string(),
                value: e.value.clone(),
                version: e.version,
            }))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StoredValue>> {
        let now = Instant::now();
        let table = self.table.read().await;
        Ok(table
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, e)| StoredValue {
                key: k.clone(),
                value: e.value.clone(),
                version: e.version,
            })
            .collect())
    }

    async fn create(&self, key: &str, value: Value, ttl: Option<Duration>) -> StorageResult<u64> {
        let now = Instant::now();
        let mut table = self.table.write().await;
        table.sweep(now);
        if table.entries.contains_key(key) {
            return Err(StorageError::KeyExists(key.to_string()));
        }

        let version = self.next_version();
        let expires_at = ttl.map(|ttl| now + ttl);
        table.entries.insert(
            key.to_string(),
            Entry {
                value,
                version,
                expires_at,
            },
        );
        table.track(expires_at);
        Ok(version)
    }

    async fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<u64> {
        let now = Instant::now();
        let mut table = self.table.write().await;
        table.sweep(now);
        let entry = table
            .entries
            .get_mut(key)
            .filter(|e| e.is_live(now))
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))?;

        if let Some(expected) = expected_version {
            if expected != entry.version {
                return Err(StorageError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    actual: entry.version,
                });
            }
        }

        let version = self.next_version();
        entry.value = value;
        entry.version = version;
        Ok(version)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let now = Instant::now();
        let mut table = self.table.write().await;
        Ok(table.entries.remove(key).is_some_and(|e| e.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_get_list() {
        let backend = MemoryBackend::new();
        backend.create("/registry/pods/a/x", json!({"n": 1}), None).await.unwrap();
        backend.create("/registry/pods/a/y", json!({"n": 2}), None).await.unwrap();
        backend.create("/registry/pods/b/z", json!({"n": 3}), None).await.unwrap();
        backend.create("/registry/podsx/a", json!({}), None).await.unwrap();

        let got = backend.get("/registry/pods/a/x").await.unwrap().unwrap();
        assert_eq!(got.value["n"], 1);

        let in_a = backend.list("/registry/pods/a/").await.unwrap();
        assert_eq!(in_a.len(), 2);

        let all = backend.list("/registry/pods/").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let backend = MemoryBackend::new();
        backend.create("/k", json!(1), None).await.unwrap();
        let err = backend.create("/k", json!(2), None).await.unwrap_err();
        assert!(matches!(err, StorageError::KeyExists(_)));
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let backend = MemoryBackend::new();
        let v1 = backend.create("/k", json!(1), None).await.unwrap();
        let v2 = backend.update("/k", json!(2), Some(v1)).await.unwrap();
        assert!(v2 > v1);

        let err = backend.update("/k", json!(3), Some(v1)).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { .. }));

        backend.update("/k", json!(4), None).await.unwrap();
        assert_eq!(backend.get("/k").await.unwrap().unwrap().value, json!(4));
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let backend = MemoryBackend::new();
        let err = backend.update("/missing", json!(1), None).await.unwrap_err();
        assert!(matches!(err, StorageError::KeyNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let backend = MemoryBackend::new();
        backend
            .create("/events/e1", json!({}), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(backend.get("/events/e1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(backend.get("/events/e1").await.unwrap().is_none());
        assert!(backend.list("/events/").await.unwrap().is_empty());

        // expired keys can be reused
        backend.create("/events/e1", json!({}), None).await.unwrap();
        assert_eq!(backend.purge_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_reclaimed_on_write() {
        let backend = MemoryBackend::new();
        let ttl = Some(Duration::from_secs(7200));
        for i in 0..1000 {
            let key = format!("/events/default/e{i}");
            backend.create(&key, json!({}), ttl).await.unwrap();
        }
        backend.create("/pods/default/web", json!({}), None).await.unwrap();
        assert_eq!(backend.table.read().await.entries.len(), 1001);

        tokio::time::advance(Duration::from_secs(7201)).await;
        assert!(backend.list("/events/").await.unwrap().is_empty());

        backend.create("/events/default/fresh", json!({}), ttl).await.unwrap();
        let table = backend.table.read().await;
        assert_eq!(table.entries.len(), 2);
        assert!(table.entries.contains_key("/pods/default/web"));
        assert_eq!(table.next_expiry, Some(Instant::now() + Duration::from_secs(7200)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        backend.create("/a", json!(1), Some(Duration::from_secs(5))).await.unwrap();
        backend.create("/b", json!(2), Some(Duration::from_secs(50))).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.purge_expired().await, 0);
        assert!(backend.get("/b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new();
        backend.create("/k", json!(1), None).await.unwrap();
        assert!(backend.delete("/k").await.unwrap());
        assert!(!backend.delete("/k").await.unwrap());
    }
}
