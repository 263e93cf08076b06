use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message in a completion history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of prior conversation handed to a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// What stage of an edit a completion call serves; used for logging and
/// prompt shaping, never for branching on backend identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    Planning,
    Generation,
    Review,
    Swarm,
}

/// Caller-scoped context threaded through every backend call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub caller: String,
    pub purpose: CallPurpose,
}

impl SessionContext {
    pub fn new(caller: impl Into<String>, purpose: CallPurpose) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            caller: caller.into(),
            purpose,
        }
    }
}

/// A normalized completion request: one prompt plus prior history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub id: Uuid,
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub session: SessionContext,
}

impl CompletionRequest {
    pub fn new(message: impl Into<String>, session: SessionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            history: Vec::new(),
            session,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Token usage reported by a backend, when available
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// The single internal completion shape every adapter normalizes into.
///
/// Downstream code never branches on backend-specific reply fields; the
/// provider tag exists only to label output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCompletion {
    pub text: String,
    pub token_usage: Option<TokenUsage>,
    pub provider: String,
}

/// Static description of one AI backend under quota management.
///
/// Loaded from configuration at startup and never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Maximum permitted calls within one calendar day
    pub daily_quota: u32,
    /// Lower rank is tried first; equal ranks keep list order
    pub priority: u32,
    /// Whether this backend may be used when it is not the first choice
    pub fallback_eligible: bool,
}

/// Uniform failure shape every adapter translates its native error envelope
/// into. Raw credentials must never appear in the message text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Required credentials or endpoint are absent; never retried against
    /// the same backend, the selector moves straight to the next provider.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend was reachable but the call failed (HTTP error status,
    /// network failure, or timeout).
    #[error("backend call failed ({status:?}): {message}")]
    CallFailed { status: Option<u16>, message: String },
    /// The reply arrived but did not contain a usable completion.
    #[error("malformed backend reply: {0}")]
    MalformedReply(String),
}

/// One failed attempt during provider rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationAttempt {
    pub provider: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl RotationAttempt {
    pub fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reason: reason.into(),
            at: Utc::now(),
        }
    }
}

/// Rotation-level failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum RotationError {
    /// Every configured backend was exhausted, unavailable, or failing.
    /// Carries the attempted providers and their failure reasons so the
    /// caller is not left with pure silence.
    #[error("provider rotation exhausted after {} attempt(s)", attempts.len())]
    Exhausted { attempts: Vec<RotationAttempt> },
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}
