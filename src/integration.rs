//! High-level service integration.
//!
//! Combines the store, usage ledger, provider pool, swarm coordinator,
//! safety validator, lock manager, and version-control gateway into one
//! [`AgentService`] behind which the CLI (or any embedding caller) drives
//! the edit pipeline.

use crate::auth::CallerIdentity;
use crate::cli::FileConfig;
use crate::error::EditError;
use crate::llm::{BackendSettings, ProviderPool, UsageLedger};
use crate::lock::LockManager;
use crate::orchestrator::{
    EditOrchestrator, EditOutcome, EditProposal, OrchestratorConfig, PendingEdit,
};
use crate::safety::SafetyValidator;
use crate::store::{KvStore, MemoryStore};
use crate::swarm::{SwarmConfig, SwarmCoordinator};
use crate::vcs::{GithubGateway, GithubSettings, RepoGateway};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// The assembled agent: one orchestrator over shared infrastructure.
pub struct AgentService {
    orchestrator: EditOrchestrator,
    store: Arc<dyn KvStore>,
    config: FileConfig,
}

impl AgentService {
    /// Wire the service up from file configuration.
    ///
    /// The in-memory store backs a single-process deployment; multi-instance
    /// deployments swap in a shared store through [`AgentService::with_parts`].
    pub fn new(config: FileConfig) -> Result<Self> {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let token = config
            .repo
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .context("repository token missing: set repo.token or GITHUB_TOKEN")?;
        let gateway: Arc<dyn RepoGateway> = Arc::new(
            GithubGateway::new(GithubSettings {
                owner: config.repo.owner.clone(),
                repo: config.repo.repo.clone(),
                token,
                base_branch: config.repo.base_branch.clone(),
                api_base: config.repo.api_base.clone(),
                request_timeout: Duration::from_secs(config.backends.request_timeout_secs),
            })
            .context("constructing repository gateway")?,
        );
        Self::with_parts(config, store, gateway)
    }

    /// Wire the service from explicit infrastructure, used by embeddings
    /// and tests that bring their own store or gateway.
    pub fn with_parts(
        config: FileConfig,
        store: Arc<dyn KvStore>,
        gateway: Arc<dyn RepoGateway>,
    ) -> Result<Self> {
        let ledger = UsageLedger::new(Arc::clone(&store));
        let settings = BackendSettings {
            groq_api_key: config.backends.groq_api_key.clone(),
            groq_model: config.backends.groq_model.clone(),
            gemini_api_key: config.backends.gemini_api_key.clone(),
            gemini_model: config.backends.gemini_model.clone(),
            qwen_base_url: config.backends.qwen_base_url.clone(),
            qwen_model: config.backends.qwen_model.clone(),
            request_timeout: Duration::from_secs(config.backends.request_timeout_secs),
        }
        .with_env_fallback();
        let pool = Arc::new(ProviderPool::new(
            config.providers.clone(),
            &settings,
            ledger,
        ));

        let swarm = SwarmCoordinator::new(SwarmConfig {
            min_size: config.swarm.min_size,
            max_size: config.swarm.max_size,
            sample_timeout: Duration::from_secs(config.swarm.sample_timeout_secs),
        });
        let validator = SafetyValidator::new(config.safety.clone());
        let locks = LockManager::new(
            Arc::clone(&store),
            Duration::from_secs(config.lock.timeout_secs),
        );

        let orchestrator = EditOrchestrator::new(
            pool,
            swarm,
            validator,
            locks,
            Arc::clone(&store),
            gateway,
            OrchestratorConfig {
                source_path: config.repo.source_path.clone(),
                base_branch: config.repo.base_branch.clone(),
                branch_prefix: config.repo.branch_prefix.clone(),
                pending_ttl: Duration::from_secs(config.pending_ttl_secs),
                use_swarm: config.swarm.enabled,
                swarm_size: config.swarm.size,
                ..OrchestratorConfig::default()
            },
        );

        info!(
            providers = config.providers.len(),
            swarm = config.swarm.enabled,
            "agent service initialized"
        );
        Ok(Self {
            orchestrator,
            store,
            config,
        })
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Plan, generate, and review an edit; leaves it pending approval.
    pub async fn propose(
        &self,
        instruction: &str,
        caller: &CallerIdentity,
    ) -> Result<EditProposal, EditError> {
        self.orchestrator.propose(instruction, caller).await
    }

    /// Apply, validate, and commit a pending edit.
    pub async fn approve(
        &self,
        edit_id: Uuid,
        caller: &CallerIdentity,
    ) -> Result<EditOutcome, EditError> {
        self.orchestrator.approve(edit_id, caller).await
    }

    /// Ids of edits awaiting approval.
    pub async fn pending(&self) -> Result<Vec<Uuid>, EditError> {
        self.orchestrator.pending().await
    }

    /// Load one pending edit for display.
    pub async fn pending_edit(&self, edit_id: Uuid) -> Result<PendingEdit, EditError> {
        self.orchestrator.load_pending(edit_id).await
    }
}
