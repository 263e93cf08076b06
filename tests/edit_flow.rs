//! End-to-end edit pipeline scenarios against scripted backends and an
//! in-memory repository gateway.

use amend::auth::CallerIdentity;
use amend::error::EditError;
use amend::llm::{BackendError, ProviderDescriptor, ProviderPool, ScriptedBackend, UsageLedger};
use amend::lock::LockManager;
use amend::orchestrator::{EditOrchestrator, OrchestratorConfig};
use amend::safety::{SafetyConfig, SafetyValidator};
use amend::store::{KvStore, MemoryStore};
use amend::swarm::{SwarmConfig, SwarmCoordinator};
use amend::vcs::{BranchHead, GatewayError, PullRequest, RepoFile, RepoGateway, TreeEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const SOURCE: &str = "function foo() {\n  return 1;\n}\n\nfunction handleRequest() {\n  return foo();\n}\n";

/// In-memory repository gateway recording every object the orchestrator
/// writes.
struct MockGateway {
    file: Mutex<String>,
    blobs: Mutex<HashMap<String, String>>,
    commits: Mutex<Vec<(String, String, Vec<String>)>>,
    refs: Mutex<HashMap<String, String>>,
    pulls: Mutex<Vec<(String, String, String, String)>>,
    counter: AtomicU64,
}

impl MockGateway {
    fn new(content: &str) -> Self {
        Self {
            file: Mutex::new(content.to_string()),
            blobs: Mutex::new(HashMap::new()),
            commits: Mutex::new(Vec::new()),
            refs: Mutex::new(HashMap::new()),
            pulls: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    fn next_sha(&self, kind: &str) -> String {
        format!("{}-{}", kind, self.counter.fetch_add(1, Ordering::SeqCst))
    }

    fn committed_blob(&self) -> Option<String> {
        let commits = self.commits.lock().unwrap();
        let (_, _tree, _) = commits.last()?;
        // One file per tree in these scenarios; return the latest blob.
        let blobs = self.blobs.lock().unwrap();
        blobs
            .iter()
            .max_by_key(|(sha, _)| sha.to_string())
            .map(|(_, content)| content.clone())
    }
}

#[async_trait]
impl RepoGateway for MockGateway {
    async fn get_file(&self, path: &str) -> Result<RepoFile, GatewayError> {
        Ok(RepoFile {
            path: path.to_string(),
            content: self.file.lock().unwrap().clone(),
            sha: "file-sha".to_string(),
        })
    }

    async fn branch_head(&self, _branch: &str) -> Result<BranchHead, GatewayError> {
        Ok(BranchHead {
            commit_sha: "head-commit".to_string(),
            tree_sha: "head-tree".to_string(),
        })
    }

    async fn create_blob(&self, content: &str) -> Result<String, GatewayError> {
        let sha = self.next_sha("blob");
        self.blobs
            .lock()
            .unwrap()
            .insert(sha.clone(), content.to_string());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        _base_tree_sha: &str,
        _entries: &[TreeEntry],
    ) -> Result<String, GatewayError> {
        Ok(self.next_sha("tree"))
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, GatewayError> {
        let sha = self.next_sha("commit");
        self.commits.lock().unwrap().push((
            message.to_string(),
            tree_sha.to_string(),
            parents.to_vec(),
        ));
        Ok(sha)
    }

    async fn update_ref(&self, branch: &str, commit_sha: &str) -> Result<(), GatewayError> {
        self.refs
            .lock()
            .unwrap()
            .insert(branch.to_string(), commit_sha.to_string());
        Ok(())
    }

    async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, GatewayError> {
        let mut pulls = self.pulls.lock().unwrap();
        pulls.push((
            title.to_string(),
            head.to_string(),
            base.to_string(),
            body.to_string(),
        ));
        Ok(PullRequest {
            number: pulls.len() as u64,
            url: format!("https://example.test/pulls/{}", pulls.len()),
        })
    }
}

const PLAN_REPLY: &str = r#"{"summary":"add a comment to foo","sections":["foo"],"risk":"low","prompt":"add a comment above function foo"}"#;
const PATCH_REPLY: &str =
    "REPLACE-START\nfunction foo() {\nWITH-MARK\n// greeter\nfunction foo() {\nBLOCK-END\n";
const REVIEW_REPLY: &str = "Small and safe; the comment does not alter behavior.";

struct Harness {
    orchestrator: EditOrchestrator,
    gateway: Arc<MockGateway>,
    store: Arc<dyn KvStore>,
    backend: Arc<ScriptedBackend>,
}

fn harness(replies: Vec<Result<String, BackendError>>, use_swarm: bool) -> Harness {
    harness_with(replies, use_swarm, Duration::from_secs(3600), SOURCE)
}

fn harness_with(
    replies: Vec<Result<String, BackendError>>,
    use_swarm: bool,
    pending_ttl: Duration,
    source: &str,
) -> Harness {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new(source));
    let backend = Arc::new(ScriptedBackend::new("groq", replies));
    let descriptor = ProviderDescriptor {
        name: "groq".to_string(),
        daily_quota: 100,
        priority: 1,
        fallback_eligible: true,
    };
    let pool = Arc::new(ProviderPool::with_backends(
        vec![(descriptor, Arc::clone(&backend) as _)],
        UsageLedger::new(Arc::clone(&store)),
    ));
    let orchestrator = EditOrchestrator::new(
        pool,
        SwarmCoordinator::new(SwarmConfig {
            min_size: 2,
            max_size: 7,
            sample_timeout: Duration::from_secs(2),
        }),
        SafetyValidator::new(SafetyConfig {
            required_markers: vec!["handleRequest".to_string()],
            ..Default::default()
        }),
        LockManager::new(Arc::clone(&store), Duration::from_secs(30)),
        Arc::clone(&store),
        Arc::clone(&gateway) as Arc<dyn RepoGateway>,
        OrchestratorConfig {
            source_path: "src/service.js".to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "amend".to_string(),
            pending_ttl,
            use_swarm,
            swarm_size: 3,
            section_context_lines: 5,
            excerpt_lines: 10,
        },
    );
    Harness {
        orchestrator,
        gateway,
        store,
        backend,
    }
}

fn caller() -> CallerIdentity {
    CallerIdentity::new("ops").with_display_name("Operations")
}

#[tokio::test]
async fn propose_then_approve_opens_a_pull_request() {
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        false,
    );

    let proposal = harness
        .orchestrator
        .propose("add a comment to function foo", &caller())
        .await
        .unwrap();
    assert_eq!(proposal.plan.summary, "add a comment to foo");
    assert_eq!(proposal.plan.sections, vec!["foo".to_string()]);
    assert_eq!(proposal.review, REVIEW_REPLY);
    assert_eq!(proposal.generated_by, "groq");
    assert_eq!(
        harness.orchestrator.pending().await.unwrap(),
        vec![proposal.edit_id]
    );

    let outcome = harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap();
    assert_eq!(outcome.pull_request.number, 1);
    assert!(outcome.skipped_ops.is_empty());
    assert!(outcome.warnings.is_empty());

    let committed = harness.gateway.committed_blob().unwrap();
    assert!(committed.contains("// greeter"));
    assert!(committed.contains("handleRequest"));

    // The branch was cut from the base head and the pending edit consumed.
    let refs = harness.gateway.refs.lock().unwrap();
    assert!(refs.keys().any(|branch| branch.starts_with("amend/")));
    drop(refs);
    assert!(harness.orchestrator.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn swarm_generation_feeds_the_same_pipeline() {
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        true,
    );

    let proposal = harness
        .orchestrator
        .propose("add a comment to function foo", &caller())
        .await
        .unwrap();
    assert!(proposal.patch.contains("REPLACE-START"));
    // One planning call, three swarm samples, one review call.
    assert_eq!(harness.backend.call_count(), 5);
}

#[tokio::test]
async fn reply_without_delimiters_fails_generation() {
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok("sure, here is the code you asked for".to_string()),
        ],
        false,
    );
    let error = harness
        .orchestrator
        .propose("do something", &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, EditError::InvalidPatchFormat(_)));
    // Nothing was persisted for a generation-stage failure.
    assert!(harness.orchestrator.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn unmatched_anchor_surfaces_no_changes_and_retains_the_edit() {
    let stale_patch =
        "REPLACE-START\nfunction vanished() {\nWITH-MARK\nfunction renamed() {\nBLOCK-END\n";
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(stale_patch.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        false,
    );
    let proposal = harness
        .orchestrator
        .propose("rename a function that no longer exists", &caller())
        .await
        .unwrap();

    let error = harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, EditError::NoChangesProduced));
    // The pending edit survives so approval can be retried.
    assert_eq!(
        harness.orchestrator.pending().await.unwrap(),
        vec![proposal.edit_id]
    );
}

#[tokio::test]
async fn dangerous_patch_fails_validation_and_releases_the_lock() {
    let hostile_patch =
        "REPLACE-START\n  return 1;\nWITH-MARK\n  return eval(input);\nBLOCK-END\n";
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(hostile_patch.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        false,
    );
    let proposal = harness
        .orchestrator
        .propose("speed up foo", &caller())
        .await
        .unwrap();

    let error = harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap_err();
    match error {
        EditError::ValidationFailed { errors, .. } => {
            assert!(errors.iter().any(|e| e.contains("dynamic code evaluation")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // A second attempt hits validation again, not a stale lock.
    let error = harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, EditError::ValidationFailed { .. }));
}

#[tokio::test]
async fn concurrent_edit_surfaces_lock_busy() {
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        false,
    );
    let proposal = harness
        .orchestrator
        .propose("add a comment to function foo", &caller())
        .await
        .unwrap();

    // Another invocation is mid-apply: the lock is held on the shared store.
    let foreign = LockManager::new(Arc::clone(&harness.store), Duration::from_secs(30));
    assert!(foreign.acquire("self-edit-lock", "other-owner").await.unwrap());

    let error = harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, EditError::LockBusy));

    // Once the holder releases, approval goes through.
    foreign.release("self-edit-lock", "other-owner").await.unwrap();
    harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_pending_edit_is_unrecoverable() {
    let harness = harness_with(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        false,
        Duration::from_millis(20),
        SOURCE,
    );
    let proposal = harness
        .orchestrator
        .propose("add a comment to function foo", &caller())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let error = harness
        .orchestrator
        .approve(proposal.edit_id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, EditError::PendingEditNotFound(id) if id == proposal.edit_id));
}

#[tokio::test]
async fn anonymous_callers_are_rejected_before_any_stage() {
    let harness = harness(vec![Ok(PLAN_REPLY.to_string())], false);
    let anonymous = CallerIdentity::new("");
    let error = harness
        .orchestrator
        .propose("do anything", &anonymous)
        .await
        .unwrap_err();
    assert!(matches!(error, EditError::Unauthorized));
    assert_eq!(harness.backend.call_count(), 0);
}

#[tokio::test]
async fn degraded_plan_still_produces_a_proposal() {
    let harness = harness(
        vec![
            Ok("I could not produce structured output, sorry".to_string()),
            Ok(PATCH_REPLY.to_string()),
            Ok(REVIEW_REPLY.to_string()),
        ],
        false,
    );
    let proposal = harness
        .orchestrator
        .propose("add a comment to function foo", &caller())
        .await
        .unwrap();
    // Planning degraded to the raw instruction instead of aborting.
    assert_eq!(proposal.plan.summary, "add a comment to function foo");
    assert!(proposal.plan.sections.is_empty());
}

#[tokio::test]
async fn review_failure_is_advisory_only() {
    let harness = harness(
        vec![
            Ok(PLAN_REPLY.to_string()),
            Ok(PATCH_REPLY.to_string()),
            Err(BackendError::CallFailed {
                status: Some(503),
                message: "review backend down".to_string(),
            }),
        ],
        false,
    );
    let proposal = harness
        .orchestrator
        .propose("add a comment to function foo", &caller())
        .await
        .unwrap();
    assert_eq!(proposal.review, "review unavailable");
    assert_eq!(
        harness.orchestrator.pending().await.unwrap(),
        vec![proposal.edit_id]
    );
}
