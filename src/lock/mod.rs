//! Advisory, TTL-bounded mutual exclusion over the shared store.
//!
//! Lock records are keyed by resource name. An unexpired record makes a
//! second acquire fail without mutation; a record past its expiry is treated
//! as absent, so a crashed owner heals itself once the TTL elapses. The
//! primitive carries no retry or backoff: callers decide what a failed
//! acquire means (the orchestrator surfaces it as "busy" immediately).

use crate::env;
use crate::store::{KvStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Persisted lock record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub key: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LockError {
    /// The resource is held by another unexpired owner
    #[error("resource '{0}' is locked by another owner")]
    Busy(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("lock record for '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// TTL-bounded lock manager over a [`KvStore`].
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KvStore>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Try to take the lock. Returns `false` without mutating anything when
    /// an unexpired record already exists; expired records are overwritten.
    pub async fn acquire(&self, resource: &str, owner: &str) -> Result<bool, LockError> {
        let now = Utc::now();
        let record = LockRecord {
            key: resource.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        };
        let serialized = serde_json::to_string(&record).map_err(|e| LockError::Corrupt {
            key: resource.to_string(),
            reason: e.to_string(),
        })?;

        let taken = self
            .store
            .put_if_absent(&env::lock_key(resource), serialized, Some(self.timeout))
            .await?;
        if taken {
            debug!(resource, owner, "lock acquired");
        } else {
            debug!(resource, owner, "lock busy");
        }
        Ok(taken)
    }

    /// Release the lock. Deletes the record only when the caller owns it;
    /// anything else is a no-op returning `false`.
    pub async fn release(&self, resource: &str, owner: &str) -> Result<bool, LockError> {
        let key = env::lock_key(resource);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(false);
        };
        let record: LockRecord = serde_json::from_str(&raw).map_err(|e| LockError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        if record.owner != owner {
            warn!(resource, owner, holder = %record.owner, "refusing release by non-owner");
            return Ok(false);
        }
        self.store.delete(&key).await?;
        debug!(resource, owner, "lock released");
        Ok(true)
    }

    /// Current holder of the resource, if any.
    pub async fn holder(&self, resource: &str) -> Result<Option<LockRecord>, LockError> {
        let key = env::lock_key(resource);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| LockError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
        }
    }

    /// Acquire, run the operation, and release no matter how the operation
    /// ends. A failed acquire returns [`LockError::Busy`] without running
    /// the operation.
    pub async fn with_lock<T, F, Fut>(
        &self,
        resource: &str,
        owner: &str,
        operation: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.acquire(resource, owner).await? {
            return Err(LockError::Busy(resource.to_string()));
        }
        let result = operation().await;
        if let Err(error) = self.release(resource, owner).await {
            warn!(resource, owner, %error, "releasing lock after operation failed");
        }
        Ok(result)
    }
}
