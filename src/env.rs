//! Environment constants and key-naming utilities for the self-modification agent.
//!
//! This module centralizes all store key formats, resource names, and
//! configuration paths used throughout the application, making them easier
//! to maintain and modify.

/// Main application directory name (hidden directory like .git, .vscode)
pub const AMEND_DIR_NAME: &str = ".amend";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Project-local configuration file name
pub const PROJECT_CONFIG_FILE_NAME: &str = "amend.toml";

/// Resource key guarding the apply/commit window of a self-edit.
///
/// One global key: the service's source is the protected resource, there is
/// no per-file locking.
pub const SELF_EDIT_LOCK: &str = "self-edit-lock";

/// Store key prefixes
pub mod keys {
    /// Prefix for pending edit records
    pub const PENDING_EDIT_PREFIX: &str = "pending_edit_";

    /// Prefix for daily usage counters
    pub const USAGE_PREFIX: &str = "usage_";

    /// Prefix for lock records
    pub const LOCK_PREFIX: &str = "lock_";
}

/// Build the store key for a pending edit record
pub fn pending_edit_key(edit_id: &uuid::Uuid) -> String {
    format!("{}{}", keys::PENDING_EDIT_PREFIX, edit_id)
}

/// Build the store key for a provider's usage counter on a calendar day
pub fn usage_key(provider: &str, day: &str) -> String {
    format!("{}{}_{}", keys::USAGE_PREFIX, provider, day)
}

/// Build the store key for a lock record
pub fn lock_key(resource: &str) -> String {
    format!("{}{}", keys::LOCK_PREFIX, resource)
}

use std::path::PathBuf;

/// Build the user-level configuration directory path
pub fn user_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(AMEND_DIR_NAME))
}

/// Build the project-level hidden configuration file path
pub fn project_config_path(workspace_root: &std::path::Path) -> PathBuf {
    workspace_root.join(AMEND_DIR_NAME).join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_key_embeds_provider_and_day() {
        assert_eq!(usage_key("groq", "2026-08-06"), "usage_groq_2026-08-06");
    }

    #[test]
    fn pending_edit_key_uses_fixed_prefix() {
        let id = uuid::Uuid::nil();
        assert!(pending_edit_key(&id).starts_with("pending_edit_"));
    }
}
