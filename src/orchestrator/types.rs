use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stages of one edit, in execution order. `Failed` is reachable from any
/// non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditStage {
    Planning,
    Generating,
    Reviewing,
    AwaitingApproval,
    Applying,
    Validating,
    Committing,
    Done,
    Failed,
}

impl EditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStage::Planning => "planning",
            EditStage::Generating => "generating",
            EditStage::Reviewing => "reviewing",
            EditStage::AwaitingApproval => "awaiting_approval",
            EditStage::Applying => "applying",
            EditStage::Validating => "validating",
            EditStage::Committing => "committing",
            EditStage::Done => "done",
            EditStage::Failed => "failed",
        }
    }
}

/// Structured plan produced by the planning backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPlan {
    pub summary: String,
    /// Source sections the change is expected to touch
    pub sections: Vec<String>,
    pub risk: String,
    /// Focused sub-prompt handed to the generation backend
    pub prompt: String,
}

#[derive(Debug, Default, Deserialize)]
struct PlanWire {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    sections: Vec<String>,
    #[serde(default)]
    risk: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
}

impl EditPlan {
    /// Parse the planning reply, degrading to a synthesized plan when the
    /// reply carries no parseable JSON object. Planning never aborts an
    /// edit.
    pub fn from_reply(reply: &str, instruction: &str) -> Self {
        match extract_json_object(reply)
            .and_then(|json| serde_json::from_str::<PlanWire>(json).ok())
        {
            Some(wire) => Self {
                summary: wire
                    .summary
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| instruction.to_string()),
                sections: wire.sections,
                risk: wire.risk.unwrap_or_else(|| "unknown".to_string()),
                prompt: wire
                    .prompt
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| instruction.to_string()),
            },
            None => Self::degraded(instruction),
        }
    }

    /// Plan synthesized from the raw instruction when planning output was
    /// unusable.
    pub fn degraded(instruction: &str) -> Self {
        Self {
            summary: instruction.to_string(),
            sections: Vec::new(),
            risk: "unknown".to_string(),
            prompt: instruction.to_string(),
        }
    }
}

/// Find the outermost JSON object embedded in a reply, tolerating prose or
/// code fences around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// A generated-but-not-yet-applied change awaiting approval.
///
/// Held in the shared store under `pending_edit_{id}` with a bounded TTL;
/// consumed on successful apply, unrecoverable after expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEdit {
    pub id: Uuid,
    pub instruction: String,
    pub plan: EditPlan,
    pub patch: String,
    pub created_at: DateTime<Utc>,
}

/// What `propose` hands back to the caller: everything needed to judge the
/// change before approving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditProposal {
    pub edit_id: Uuid,
    pub plan: EditPlan,
    pub patch: String,
    /// Advisory reviewer critique; informational only
    pub review: String,
    /// Backend that produced the patch
    pub generated_by: String,
}

/// Result of a successfully committed edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOutcome {
    pub edit_id: Uuid,
    pub commit_sha: String,
    pub pull_request: crate::vcs::PullRequest,
    /// Validator warnings surfaced with the commit
    pub warnings: Vec<String>,
    /// Patch operations whose anchors matched nothing and were dropped
    pub skipped_ops: Vec<usize>,
}
