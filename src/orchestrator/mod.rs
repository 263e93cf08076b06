//! Edit orchestration: the multi-stage state machine coordinating backend
//! calls, patch application, safety validation, and commit.
//!
//! One edit moves through `Planning → Generating → Reviewing →
//! AwaitingApproval`, pauses for an explicit human approval, then runs
//! `Applying → Validating → Committing → Done` under the self-edit lock.
//! `Failed` is reachable from any stage; the lock is always released, and a
//! pending edit survives apply/commit failures so the caller can retry
//! approval without repeating the expensive generation stage.
//!
//! ## Stage responsibilities
//!
//! - **Planning**: fetch the current source, ask a planning backend for a
//!   structured plan, degrade gracefully when the reply does not parse.
//! - **Generating**: produce the patch through the swarm (with single-call
//!   fallback) or plain provider rotation, against a trimmed source view.
//! - **Reviewing**: collect an advisory critique; never blocks progression.
//! - **AwaitingApproval**: persist the pending edit with a bounded TTL and
//!   return control to the caller.
//! - **Applying/Validating/Committing**: under the lock, re-fetch the
//!   source, apply the patch, run the safety validator, and commit through
//!   the version-control gateway, finishing with a pull request.

pub mod types;

pub use types::{EditOutcome, EditPlan, EditProposal, EditStage, PendingEdit};

use crate::auth::CallerIdentity;
use crate::env;
use crate::error::EditError;
use crate::llm::{CallPurpose, CompletionRequest, ProviderPool, SessionContext};
use crate::lock::LockManager;
use crate::patch;
use crate::safety::SafetyValidator;
use crate::store::KvStore;
use crate::swarm::{SwarmCoordinator, SwarmError};
use crate::vcs::{RepoGateway, TreeEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Orchestrator-level configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Repository path of the service's own source file
    pub source_path: String,
    /// Branch proposals are cut from and merged back into
    pub base_branch: String,
    /// Prefix for the per-edit branch name
    pub branch_prefix: String,
    /// Time a pending edit stays approvable
    pub pending_ttl: Duration,
    /// Whether generation fans out through the swarm
    pub use_swarm: bool,
    /// Requested swarm size (clamped by the coordinator)
    pub swarm_size: usize,
    /// Context lines kept around each resolved plan section
    pub section_context_lines: usize,
    /// Head/tail lines kept when no plan section resolves
    pub excerpt_lines: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source_path: "src/service.js".to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "amend".to_string(),
            pending_ttl: Duration::from_secs(3600),
            use_swarm: true,
            swarm_size: 3,
            section_context_lines: 15,
            excerpt_lines: 40,
        }
    }
}

/// Top-level state machine for one self-edit.
pub struct EditOrchestrator {
    pool: Arc<ProviderPool>,
    swarm: SwarmCoordinator,
    validator: SafetyValidator,
    locks: LockManager,
    store: Arc<dyn KvStore>,
    gateway: Arc<dyn RepoGateway>,
    config: OrchestratorConfig,
}

impl EditOrchestrator {
    pub fn new(
        pool: Arc<ProviderPool>,
        swarm: SwarmCoordinator,
        validator: SafetyValidator,
        locks: LockManager,
        store: Arc<dyn KvStore>,
        gateway: Arc<dyn RepoGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pool,
            swarm,
            validator,
            locks,
            store,
            gateway,
            config,
        }
    }

    fn enter(&self, edit_id: Uuid, stage: EditStage) {
        info!(edit_id = %edit_id, stage = stage.as_str(), "entering stage");
    }

    /// Run Planning through AwaitingApproval for one instruction.
    ///
    /// Nothing is persisted until the pending edit is written, so a failure
    /// in these stages leaves no partial state behind.
    pub async fn propose(
        &self,
        instruction: &str,
        caller: &CallerIdentity,
    ) -> Result<EditProposal, EditError> {
        if caller.is_anonymous() {
            return Err(EditError::Unauthorized);
        }
        let edit_id = Uuid::new_v4();
        let result = self.propose_stages(edit_id, instruction, caller).await;
        if let Err(e) = &result {
            error!(edit_id = %edit_id, stage = EditStage::Failed.as_str(), error = %e, "proposal failed");
        }
        result
    }

    async fn propose_stages(
        &self,
        edit_id: Uuid,
        instruction: &str,
        caller: &CallerIdentity,
    ) -> Result<EditProposal, EditError> {
        // Planning
        self.enter(edit_id, EditStage::Planning);
        let source = self.gateway.get_file(&self.config.source_path).await?;
        let plan_request = CompletionRequest::new(
            planning_prompt(&self.config.source_path, instruction),
            SessionContext::new(&caller.subject, CallPurpose::Planning),
        );
        let plan = match self.pool.dispatch(&plan_request).await {
            Ok(outcome) => EditPlan::from_reply(&outcome.completion.text, instruction),
            Err(error) => return Err(error.into()),
        };
        info!(edit_id = %edit_id, sections = plan.sections.len(), risk = %plan.risk, "plan ready");

        // Generating
        self.enter(edit_id, EditStage::Generating);
        let view = trimmed_view(
            &source.content,
            &plan,
            self.config.section_context_lines,
            self.config.excerpt_lines,
        );
        let generation_request = CompletionRequest::new(
            generation_prompt(&plan.prompt, &view),
            SessionContext::new(&caller.subject, CallPurpose::Generation),
        );
        let (patch_text, generated_by) = self.generate(&generation_request).await?;
        if !patch::contains_marker(&patch_text) {
            return Err(EditError::InvalidPatchFormat(
                "reply contains no recognized patch delimiters".to_string(),
            ));
        }
        // Validate protocol shape now so approval cannot trip over it later.
        patch::parse(&patch_text)?;

        // Reviewing: advisory only, never blocks progression.
        self.enter(edit_id, EditStage::Reviewing);
        let review_request = CompletionRequest::new(
            review_prompt(&plan.summary, &patch_text),
            SessionContext::new(&caller.subject, CallPurpose::Review),
        );
        let review = match self.pool.dispatch(&review_request).await {
            Ok(outcome) => outcome.completion.text,
            Err(error) => {
                warn!(edit_id = %edit_id, %error, "review stage failed, continuing without critique");
                "review unavailable".to_string()
            }
        };

        // AwaitingApproval
        self.enter(edit_id, EditStage::AwaitingApproval);
        let pending = PendingEdit {
            id: edit_id,
            instruction: instruction.to_string(),
            plan: plan.clone(),
            patch: patch_text.clone(),
            created_at: chrono::Utc::now(),
        };
        let serialized = serde_json::to_string(&pending).map_err(|e| {
            EditError::Store(crate::store::StoreError::InvalidValue {
                key: env::pending_edit_key(&edit_id),
                reason: e.to_string(),
            })
        })?;
        self.store
            .put(
                &env::pending_edit_key(&edit_id),
                serialized,
                Some(self.config.pending_ttl),
            )
            .await?;
        info!(edit_id = %edit_id, "pending edit stored, awaiting approval");

        Ok(EditProposal {
            edit_id,
            plan,
            patch: patch_text,
            review,
            generated_by,
        })
    }

    /// Produce the patch text: swarm first when enabled, falling back to a
    /// single non-swarm call against the same backend when every sample
    /// fails, and to plain provider rotation when no swarm backend is
    /// available at all.
    async fn generate(
        &self,
        request: &CompletionRequest,
    ) -> Result<(String, String), EditError> {
        if self.config.use_swarm {
            if let Some(descriptor) = self.pool.select().await.map_err(EditError::Store)? {
                let name = descriptor.name.clone();
                if let Some(backend) = self.pool.backend(&name) {
                    match self
                        .swarm
                        .run(Arc::clone(&backend), request, self.config.swarm_size)
                        .await
                    {
                        Ok(consensus) => {
                            self.pool
                                .ledger()
                                .record_call(&name)
                                .await
                                .map_err(EditError::Store)?;
                            info!(
                                backend = %name,
                                confidence = consensus.confidence,
                                "generation via swarm consensus"
                            );
                            return Ok((consensus.response, name));
                        }
                        Err(SwarmError::Exhausted { attempted }) => {
                            warn!(
                                backend = %name,
                                attempted,
                                "swarm exhausted, falling back to single call"
                            );
                            let completion = backend.complete(request.clone()).await?;
                            self.pool
                                .ledger()
                                .record_call(&name)
                                .await
                                .map_err(EditError::Store)?;
                            return Ok((completion.text, name));
                        }
                    }
                }
            }
        }
        let outcome = self.pool.dispatch(request).await?;
        Ok((outcome.completion.text, outcome.completion.provider))
    }

    /// Run Applying through Committing for an approved edit, serialized by
    /// the self-edit lock. A busy lock surfaces immediately as
    /// [`EditError::LockBusy`].
    pub async fn approve(
        &self,
        edit_id: Uuid,
        caller: &CallerIdentity,
    ) -> Result<EditOutcome, EditError> {
        if caller.is_anonymous() {
            return Err(EditError::Unauthorized);
        }
        let result = self
            .locks
            .with_lock(env::SELF_EDIT_LOCK, &caller.subject, || {
                self.apply_stages(edit_id)
            })
            .await;
        let outcome = match result {
            Ok(inner) => inner,
            Err(lock_error) => Err(lock_error.into()),
        };
        if let Err(e) = &outcome {
            error!(edit_id = %edit_id, stage = EditStage::Failed.as_str(), error = %e, "approval failed");
        }
        outcome
    }

    async fn apply_stages(&self, edit_id: Uuid) -> Result<EditOutcome, EditError> {
        // Applying
        self.enter(edit_id, EditStage::Applying);
        let pending = self.load_pending(edit_id).await?;

        // The source may have moved since planning; apply against the
        // current head, not the planning-time snapshot.
        let source = self.gateway.get_file(&self.config.source_path).await?;
        let ops = patch::parse(&pending.patch)?;
        let (candidate, report) = patch::apply(&source.content, &ops);
        if candidate == source.content {
            return Err(EditError::NoChangesProduced);
        }
        if !report.is_clean() {
            warn!(
                edit_id = %edit_id,
                skipped = ?report.skipped,
                "patch anchors matched nothing for some operations"
            );
        }

        // Validating
        self.enter(edit_id, EditStage::Validating);
        let validation = self.validator.validate(&candidate, &source.content);
        if !validation.commit_allowed() {
            return Err(EditError::ValidationFailed {
                errors: validation.errors,
                warnings: validation.warnings,
            });
        }

        // Committing
        self.enter(edit_id, EditStage::Committing);
        let head = self.gateway.branch_head(&self.config.base_branch).await?;
        let blob_sha = self.gateway.create_blob(&candidate).await?;
        let tree_sha = self
            .gateway
            .create_tree(
                &head.tree_sha,
                &[TreeEntry {
                    path: self.config.source_path.clone(),
                    blob_sha,
                }],
            )
            .await?;
        let commit_sha = self
            .gateway
            .create_commit(
                &format!("self-edit: {}", pending.plan.summary),
                &tree_sha,
                std::slice::from_ref(&head.commit_sha),
            )
            .await?;
        let branch = format!("{}/{}", self.config.branch_prefix, edit_id.simple());
        self.gateway.update_ref(&branch, &commit_sha).await?;
        let pull_request = self
            .gateway
            .create_pull_request(
                &pending.plan.summary,
                &branch,
                &self.config.base_branch,
                &pull_request_body(&pending, &validation.warnings),
            )
            .await?;

        // Success consumes the pending edit; failures above retain it so
        // the caller can retry approval.
        self.store.delete(&env::pending_edit_key(&edit_id)).await?;
        self.enter(edit_id, EditStage::Done);
        info!(edit_id = %edit_id, pr = pull_request.number, commit = %commit_sha, "edit committed");

        Ok(EditOutcome {
            edit_id,
            commit_sha,
            pull_request,
            warnings: validation.warnings,
            skipped_ops: report.skipped,
        })
    }

    /// Load one live pending edit.
    pub async fn load_pending(&self, edit_id: Uuid) -> Result<PendingEdit, EditError> {
        let raw = self
            .store
            .get(&env::pending_edit_key(&edit_id))
            .await?
            .ok_or(EditError::PendingEditNotFound(edit_id))?;
        serde_json::from_str(&raw).map_err(|e| {
            EditError::Store(crate::store::StoreError::InvalidValue {
                key: env::pending_edit_key(&edit_id),
                reason: e.to_string(),
            })
        })
    }

    /// Ids of every live pending edit.
    pub async fn pending(&self) -> Result<Vec<Uuid>, EditError> {
        let keys = self
            .store
            .keys_with_prefix(env::keys::PENDING_EDIT_PREFIX)
            .await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(env::keys::PENDING_EDIT_PREFIX))
            .filter_map(|suffix| Uuid::parse_str(suffix).ok())
            .collect())
    }
}

fn planning_prompt(source_path: &str, instruction: &str) -> String {
    format!(
        "You maintain the service source file `{source_path}`. A caller asked for this \
         change:\n\n{instruction}\n\nReply with one JSON object of the shape \
         {{\"summary\": string, \"sections\": [string], \"risk\": \"low\"|\"medium\"|\"high\", \
         \"prompt\": string}} where `sections` names the functions or regions the change \
         touches and `prompt` is a focused instruction for the code-writing model."
    )
}

fn generation_prompt(focused_prompt: &str, source_view: &str) -> String {
    format!(
        "Apply this change to the source below:\n\n{focused_prompt}\n\nSource \
         view:\n```\n{source_view}\n```\n\nReply ONLY with patch blocks using these exact \
         delimiters, each on its own line:\n{replace}\n<text to find>\n{with}\n<text to \
         insert instead>\n{end}\n\nor for pure insertion:\n{insert}\n<anchor \
         text>\n{content}\n<text to insert after the anchor>\n{end}",
        replace = patch::REPLACE_START,
        with = patch::WITH_MARK,
        end = patch::BLOCK_END,
        insert = patch::INSERT_AFTER_START,
        content = patch::CONTENT_MARK,
    )
}

fn review_prompt(plan_summary: &str, patch_text: &str) -> String {
    format!(
        "Review this proposed change. Planned intent: {plan_summary}\n\nPatch:\n{patch_text}\n\n\
         Point out risks, bugs, or omissions in a short paragraph. The review is advisory; \
         do not reply with a patch."
    )
}

/// Trim the source to the sections the plan names, or to a head/tail
/// excerpt when none of them resolve.
fn trimmed_view(
    source: &str,
    plan: &EditPlan,
    context_lines: usize,
    excerpt_lines: usize,
) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut chunks = Vec::new();

    for section in &plan.sections {
        if let Some(hit) = lines.iter().position(|line| line.contains(section.as_str())) {
            let start = hit.saturating_sub(context_lines);
            let end = (hit + context_lines + 1).min(lines.len());
            chunks.push(format!(
                "... section `{}` ...\n{}",
                section,
                lines[start..end].join("\n")
            ));
        }
    }

    if !chunks.is_empty() {
        return chunks.join("\n\n");
    }

    if lines.len() <= excerpt_lines * 2 {
        return source.to_string();
    }
    let head = lines[..excerpt_lines].join("\n");
    let tail = lines[lines.len() - excerpt_lines..].join("\n");
    format!("{head}\n\n... {} lines omitted ...\n\n{tail}", lines.len() - excerpt_lines * 2)
}

fn pull_request_body(pending: &PendingEdit, warnings: &[String]) -> String {
    let mut body = format!(
        "Automated self-edit.\n\nInstruction:\n> {}\n\nPlan: {} (risk: {})",
        pending.instruction, pending.plan.summary, pending.plan.risk
    );
    if !warnings.is_empty() {
        body.push_str("\n\nValidator warnings:\n");
        for warning in warnings {
            body.push_str(&format!("- {}\n", warning));
        }
    }
    body
}
