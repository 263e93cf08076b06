//! Provider-agnostic AI backend interface.
//!
//! Backends are opaque text-in/text-out services. Each family gets one
//! adapter that normalizes a (prompt, history, session) triple into that
//! backend's wire format and the reply into a single internal
//! [`NormalizedCompletion`] shape; backend-specific failures surface as one
//! uniform [`BackendError`]. On top of the adapters sit the
//! [`UsageLedger`] (per-backend, per-day quota counters) and the
//! [`ProviderPool`] (quota-aware selection and fallback rotation).

pub mod backend;
pub mod gemini;
pub mod groq;
mod openai_wire;
pub mod qwen;
pub mod selector;
pub mod types;
pub mod usage;

pub use backend::{Backend, BackendFactory, BackendSettings, ScriptedBackend};
pub use selector::{PoolEntry, ProviderPool, RotationOutcome};
pub use types::{
    BackendError, CallPurpose, ChatMessage, ChatRole, CompletionRequest, NormalizedCompletion,
    ProviderDescriptor, RotationAttempt, RotationError, SessionContext, TokenUsage,
};
pub use usage::UsageLedger;
