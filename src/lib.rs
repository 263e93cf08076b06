//! # Amend
//!
//! An AI-assisted self-modification agent: given a natural-language
//! instruction, it plans a code change, asks a generation backend for a
//! patch, has a reviewer backend critique it, and, after human approval,
//! applies the patch to the service's own source and commits it through a
//! version-control host.
//!
//! ## Architecture Overview
//!
//! The pipeline is built from a handful of subsystems:
//!
//! - **[`llm`]**: backend adapters, the daily usage ledger, and quota-aware
//!   provider rotation
//! - **[`swarm`]**: parallel sampling against one backend, reduced to a
//!   scored consensus answer
//! - **[`patch`]**: the fixed-delimiter patch protocol with exact and
//!   fuzzy-window application
//! - **[`safety`]**: pattern-based static scan of the patched source
//! - **[`lock`]**: TTL-bounded mutual exclusion serializing self-edits
//! - **[`orchestrator`]**: the multi-stage state machine tying it together
//! - **[`vcs`]**: the version-control gateway boundary (blob/tree/commit/
//!   ref/pull-request primitives)
//! - **[`store`]**: the shared key-value store everything coordinates
//!   through
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amend::{AgentService, CallerIdentity, FileConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = AgentService::new(FileConfig::default())?;
//!     let caller = CallerIdentity::new("ops");
//!
//!     let proposal = service.propose("add a comment to function foo", &caller).await?;
//!     println!("review: {}", proposal.review);
//!
//!     let outcome = service.approve(proposal.edit_id, &caller).await?;
//!     println!("opened {}", outcome.pull_request.url);
//!     Ok(())
//! }
//! ```

/// Shared key-value store abstraction with TTL and atomic counters.
pub mod store;

/// Provider-agnostic AI backend interface.
///
/// Adapters per backend family, the per-day usage ledger, and the
/// quota-aware provider pool with fallback rotation.
pub mod llm;

/// Swarm coordination: parallel samples reduced to a consensus answer.
pub mod swarm;

/// Fixed-delimiter patch protocol: parsing and exact/fuzzy application.
pub mod patch;

/// Heuristic safety scan of generated source.
pub mod safety;

/// Advisory, TTL-bounded mutual exclusion over the shared store.
pub mod lock;

/// Version-control gateway boundary and the GitHub adapter.
pub mod vcs;

/// The edit state machine: plan, generate, review, approve, apply, commit.
pub mod orchestrator;

/// Caller identity boundary.
pub mod auth;

/// Top-level error taxonomy.
pub mod error;

/// High-level service integration.
pub mod integration;

/// Environment constants and key-naming utilities.
pub mod env;

/// Command-line interface: argument parsing and configuration discovery.
pub mod cli;

// Re-export the main service types
pub use auth::CallerIdentity;
pub use cli::{Cli, Command, ConfigDiscovery, FileConfig};
pub use error::EditError;
pub use integration::AgentService;
pub use llm::{
    Backend, BackendError, CompletionRequest, NormalizedCompletion, ProviderDescriptor,
    ProviderPool, UsageLedger,
};
pub use orchestrator::{EditOrchestrator, EditOutcome, EditPlan, EditProposal, EditStage};
pub use store::{KvStore, MemoryStore};
pub use swarm::{ConsensusResult, SwarmConfig, SwarmCoordinator};
pub use vcs::{PullRequest, RepoGateway};
