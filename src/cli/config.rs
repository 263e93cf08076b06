//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./amend.toml or ./.amend/config.toml
//! 2. User config: ~/.amend/config.toml
//! 3. Built-in defaults

use crate::env;
use crate::llm::ProviderDescriptor;
use crate::safety::SafetyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Backend credential and endpoint table.
///
/// Keys left unset here fall back to the conventional environment
/// variables at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendFileConfig {
    pub groq_api_key: Option<String>,
    pub groq_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub qwen_base_url: Option<String>,
    pub qwen_model: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmFileConfig {
    pub enabled: bool,
    pub size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub sample_timeout_secs: u64,
}

impl Default for SwarmFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 3,
            min_size: 2,
            max_size: 7,
            sample_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFileConfig {
    pub timeout_secs: u64,
    /// Suggested wait before retrying a busy lock; the primitive itself
    /// never retries
    pub retry_delay_secs: u64,
}

impl Default for LockFileConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFileConfig {
    pub owner: String,
    pub repo: String,
    pub base_branch: String,
    pub branch_prefix: String,
    /// Repository path of the service's own source file
    pub source_path: String,
    /// Token is usually supplied via GITHUB_TOKEN instead of the file
    pub token: Option<String>,
    pub api_base: Option<String>,
}

impl Default for RepoFileConfig {
    fn default() -> Self {
        Self {
            owner: "example".to_string(),
            repo: "self-service".to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "amend".to_string(),
            source_path: "src/service.js".to_string(),
            token: None,
            api_base: None,
        }
    }
}

/// Root configuration file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderDescriptor>,
    #[serde(default)]
    pub backends: BackendFileConfig,
    #[serde(default)]
    pub swarm: SwarmFileConfig,
    #[serde(default)]
    pub lock: LockFileConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub repo: RepoFileConfig,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
}

fn default_pending_ttl_secs() -> u64 {
    3600
}

/// The provider rotation table mirrors the deployed service: groq first,
/// gemini as the fallback, the self-hosted qwen endpoint last.
fn default_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor {
            name: "groq".to_string(),
            daily_quota: 30,
            priority: 1,
            fallback_eligible: true,
        },
        ProviderDescriptor {
            name: "gemini".to_string(),
            daily_quota: 15,
            priority: 2,
            fallback_eligible: true,
        },
        ProviderDescriptor {
            name: "qwen".to_string(),
            daily_quota: 50,
            priority: 3,
            fallback_eligible: true,
        },
    ]
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            backends: BackendFileConfig::default(),
            swarm: SwarmFileConfig::default(),
            lock: LockFileConfig::default(),
            safety: SafetyConfig::default(),
            repo: RepoFileConfig::default(),
            pending_ttl_secs: default_pending_ttl_secs(),
        }
    }
}

impl FileConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> anyhow::Result<FileConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return FileConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(FileConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn config_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![
            PathBuf::from(env::PROJECT_CONFIG_FILE_NAME),
            PathBuf::from(env::AMEND_DIR_NAME).join(env::CONFIG_FILE_NAME),
        ];
        if let Some(user_dir) = env::user_config_dir() {
            candidates.push(user_dir.join(env::CONFIG_FILE_NAME));
        }
        candidates
    }

    /// Show configuration discovery information
    pub fn show_discovery_info() {
        println!("Configuration discovery order:");
        for (index, candidate) in Self::config_candidates().iter().enumerate() {
            let marker = if candidate.is_file() { "found" } else { "absent" };
            println!("  {}. {} ({})", index + 1, candidate.display(), marker);
        }
    }
}
