use crate::llm::backend::{Backend, BackendFactory, BackendSettings};
use crate::llm::types::{
    CompletionRequest, NormalizedCompletion, ProviderDescriptor, RotationAttempt, RotationError,
};
use crate::llm::usage::UsageLedger;
use crate::store::StoreError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A provider slot: its static descriptor plus the adapter serving it.
///
/// A backend whose construction failed (missing credentials) stays in the
/// pool as an unavailable slot so rotation can report why it was skipped.
pub struct PoolEntry {
    pub descriptor: ProviderDescriptor,
    backend: Result<Arc<dyn Backend>, String>,
}

/// Outcome of a rotated dispatch: the completion plus every attempt that
/// failed before it.
#[derive(Debug)]
pub struct RotationOutcome {
    pub completion: NormalizedCompletion,
    pub attempts: Vec<RotationAttempt>,
}

/// Quota-aware provider selection and rotation.
///
/// Providers are held in priority order (stable within equal ranks, so
/// tie-break is positional and deterministic). Selection itself has no side
/// effects; the usage counter is incremented only after a successful
/// dispatch.
pub struct ProviderPool {
    entries: Vec<PoolEntry>,
    ledger: UsageLedger,
}

impl ProviderPool {
    /// Build the pool from the configured descriptor table, constructing an
    /// adapter per backend family. Construction failures are kept as
    /// unavailable slots rather than dropped.
    pub fn new(
        descriptors: Vec<ProviderDescriptor>,
        settings: &BackendSettings,
        ledger: UsageLedger,
    ) -> Self {
        let mut entries: Vec<PoolEntry> = descriptors
            .into_iter()
            .map(|descriptor| {
                let backend = BackendFactory::create(&descriptor.name, settings)
                    .map_err(|e| e.to_string());
                if let Err(reason) = &backend {
                    warn!(provider = %descriptor.name, %reason, "backend not available");
                }
                PoolEntry {
                    descriptor,
                    backend,
                }
            })
            .collect();
        entries.sort_by_key(|entry| entry.descriptor.priority);
        Self { entries, ledger }
    }

    /// Build the pool from pre-constructed backends; used by tests and by
    /// callers embedding their own adapters.
    pub fn with_backends(
        backends: Vec<(ProviderDescriptor, Arc<dyn Backend>)>,
        ledger: UsageLedger,
    ) -> Self {
        let mut entries: Vec<PoolEntry> = backends
            .into_iter()
            .map(|(descriptor, backend)| PoolEntry {
                descriptor,
                backend: Ok(backend),
            })
            .collect();
        entries.sort_by_key(|entry| entry.descriptor.priority);
        Self { entries, ledger }
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    /// Select the first provider whose daily usage is under its quota, in
    /// priority order. Returns `None` when every provider is exhausted.
    /// Selection never mutates the ledger.
    pub async fn select(&self) -> Result<Option<&ProviderDescriptor>, StoreError> {
        for entry in &self.entries {
            let usage = self.ledger.usage(&entry.descriptor.name).await?;
            if usage < entry.descriptor.daily_quota {
                return Ok(Some(&entry.descriptor));
            }
            debug!(
                provider = %entry.descriptor.name,
                usage,
                quota = entry.descriptor.daily_quota,
                "provider exhausted, skipping"
            );
        }
        Ok(None)
    }

    /// The adapter for a named provider, when it constructed successfully.
    pub fn backend(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
            .and_then(|entry| entry.backend.as_ref().ok().cloned())
    }

    /// Dispatch a completion through provider rotation.
    ///
    /// Walks providers in priority order, skipping exhausted slots, slots
    /// that are not fallback-eligible once a primary candidate has been
    /// passed over, and slots whose adapter is unavailable. The first
    /// success increments the ledger and returns together with the list of
    /// failed attempts; exhausting the list raises
    /// [`RotationError::Exhausted`] carrying every attempt.
    pub async fn dispatch(
        &self,
        request: &CompletionRequest,
    ) -> Result<RotationOutcome, RotationError> {
        let mut attempts = Vec::new();
        let mut primary_passed = false;

        for entry in &self.entries {
            let name = entry.descriptor.name.as_str();

            let usage = self.ledger.usage(name).await?;
            if usage >= entry.descriptor.daily_quota {
                attempts.push(RotationAttempt::new(
                    name,
                    format!("daily quota exhausted ({}/{})", usage, entry.descriptor.daily_quota),
                ));
                continue;
            }

            if primary_passed && !entry.descriptor.fallback_eligible {
                attempts.push(RotationAttempt::new(name, "not fallback eligible"));
                continue;
            }
            primary_passed = true;

            let backend = match &entry.backend {
                Ok(backend) => backend,
                Err(reason) => {
                    // Missing credentials: not retried, move straight on.
                    attempts.push(RotationAttempt::new(name, reason.clone()));
                    continue;
                }
            };

            match backend.complete(request.clone()).await {
                Ok(completion) => {
                    self.ledger.record_call(name).await?;
                    info!(
                        provider = name,
                        failed_attempts = attempts.len(),
                        purpose = ?request.session.purpose,
                        "completion dispatched"
                    );
                    return Ok(RotationOutcome {
                        completion,
                        attempts,
                    });
                }
                Err(error) => {
                    warn!(provider = name, %error, "backend call failed, rotating");
                    attempts.push(RotationAttempt::new(name, error.to_string()));
                }
            }
        }

        Err(RotationError::Exhausted { attempts })
    }
}
