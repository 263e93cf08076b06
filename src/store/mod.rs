//! Shared key-value store abstraction.
//!
//! Every piece of cross-invocation state (usage counters, lock records,
//! pending edits) lives behind [`KvStore`]. Invocations are stateless and
//! may run concurrently across process instances, so the trait is the only
//! coordination point between them.
//!
//! Counter updates and lock acquisition must not lose writes under
//! concurrency, so the trait requires atomic [`KvStore::increment`] and
//! [`KvStore::put_if_absent`] operations rather than leaving callers to
//! read-then-write. Stores that cannot provide them are not eligible
//! backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// Errors surfaced by store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored value for '{key}' is not valid: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Async key-value store with per-entry TTL and atomic counter support.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value; expired entries are treated as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, optionally bounded by a time-to-live.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>)
    -> Result<(), StoreError>;

    /// Write a value only when the key is absent (or its entry has expired).
    /// Returns whether the write happened. This is the compare-and-set
    /// primitive the lock is built on.
    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete a key, returning whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment a numeric counter, creating it at 1 when absent.
    /// Returns the new value.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// List live keys beginning with the given prefix.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`KvStore`] for single-process deployments and tests.
///
/// Entries are held in a concurrent map; expiry is lazy: an expired entry
/// is treated as absent by every read and purged on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .map(|ttl| Utc::now() + ttl)
        })
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Utc::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Purge lazily so expired entries do not accumulate.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut written = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            written = true;
            Entry {
                value: value.clone(),
                expires_at: Self::expiry(ttl),
            }
        });
        if !written && entry.is_expired(now) {
            *entry = Entry {
                value,
                expires_at: Self::expiry(ttl),
            };
            written = true;
        }
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current: u64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{}' is not a counter", entry.value),
            })?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now) && entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryStore::new();
        store.put("k", "v".to_string(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .put("k", "v".to_string(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_respects_live_entry() {
        let store = MemoryStore::new();
        assert!(store
            .put_if_absent("k", "first".to_string(), None)
            .await
            .unwrap());
        assert!(!store
            .put_if_absent("k", "second".to_string(), None)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn put_if_absent_overwrites_expired_entry() {
        let store = MemoryStore::new();
        store
            .put("k", "stale".to_string(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store
            .put_if_absent("k", "fresh".to_string(), None)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn increment_is_atomic_across_tasks() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.increment("counter").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get("counter").await.unwrap(), Some("32".to_string()));
    }

    #[tokio::test]
    async fn keys_with_prefix_skips_expired() {
        let store = MemoryStore::new();
        store.put("pending_edit_a", "1".into(), None).await.unwrap();
        store
            .put(
                "pending_edit_b",
                "2".into(),
                Some(Duration::from_millis(5)),
            )
            .await
            .unwrap();
        store.put("usage_groq", "3".into(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let keys = store.keys_with_prefix("pending_edit_").await.unwrap();
        assert_eq!(keys, vec!["pending_edit_a".to_string()]);
    }
}
