//! Caller identity boundary.
//!
//! Authentication is performed by an external collaborator (session/OAuth
//! issuance is out of scope); the orchestrator only requires that a verified
//! identity is attached to every invocation. A [`CallerIdentity`] therefore
//! represents an already-verified caller, and the orchestrator rejects
//! anonymous ones before any stage runs.

use serde::{Deserialize, Serialize};

/// A verified caller identity supplied by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Stable subject identifier (e.g. a user id or service account name)
    pub subject: String,
    /// Optional human-readable label for logs and PR attribution
    pub display_name: Option<String>,
}

impl CallerIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// An identity with an empty subject carries no verification and must be
    /// rejected by every entry point.
    pub fn is_anonymous(&self) -> bool {
        self.subject.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_subject_is_anonymous() {
        assert!(CallerIdentity::new("").is_anonymous());
        assert!(CallerIdentity::new("  ").is_anonymous());
        assert!(!CallerIdentity::new("ops-bot").is_anonymous());
    }
}
