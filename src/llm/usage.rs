use crate::env;
use crate::store::{KvStore, StoreError};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::debug;

/// Per-backend, per-day call counters against the daily quota.
///
/// Counters are append-only: they are incremented after a successful
/// dispatch and never decremented. A day rollover is not a reset: the next
/// call simply lands on a fresh calendar-day key and the old keys become
/// inert. The ledger is shared between concurrent invocations and relies on
/// the store's atomic increment, so concurrent writers cannot lose updates.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn KvStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Calls made by the provider today; absent counters read as 0.
    pub async fn usage(&self, provider: &str) -> Result<u32, StoreError> {
        self.usage_on(provider, &Self::today()).await
    }

    /// Calls made by the provider on an explicit calendar day.
    pub async fn usage_on(&self, provider: &str, day: &str) -> Result<u32, StoreError> {
        let key = env::usage_key(provider, day);
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| StoreError::InvalidValue {
                key,
                reason: format!("'{}' is not a counter", raw),
            }),
        }
    }

    /// Record one successful dispatch against the provider's daily counter.
    pub async fn record_call(&self, provider: &str) -> Result<u32, StoreError> {
        let key = env::usage_key(provider, &Self::today());
        let count = self.store.increment(&key).await?;
        debug!(provider, count, "recorded backend call");
        Ok(count as u32)
    }
}

/// Parse a usage key's day component; used by maintenance tooling to spot
/// inert keys.
pub fn day_of_key(key: &str) -> Option<NaiveDate> {
    let day = key.rsplit('_').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn absent_counter_reads_as_zero() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
        assert_eq!(ledger.usage("groq").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn record_call_increments_todays_counter() {
        let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
        ledger.record_call("groq").await.unwrap();
        ledger.record_call("groq").await.unwrap();
        assert_eq!(ledger.usage("groq").await.unwrap(), 2);
        assert_eq!(ledger.usage("gemini").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn day_rollover_is_a_fresh_key() {
        let store = Arc::new(MemoryStore::new());
        let ledger = UsageLedger::new(store.clone());
        // Yesterday's counter stays inert under its own key.
        store
            .put(&env::usage_key("groq", "2026-08-05"), "29".into(), None)
            .await
            .unwrap();
        assert_eq!(ledger.usage_on("groq", "2026-08-05").await.unwrap(), 29);
        assert_eq!(ledger.usage("groq").await.unwrap(), 0);
    }

    #[test]
    fn day_of_key_parses_calendar_suffix() {
        assert_eq!(
            day_of_key("usage_groq_2026-08-06"),
            NaiveDate::from_ymd_opt(2026, 8, 6)
        );
        assert_eq!(day_of_key("usage_groq_garbage"), None);
    }
}
