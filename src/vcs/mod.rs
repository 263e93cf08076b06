//! Version control gateway boundary.
//!
//! The repository host is an external collaborator exposing blob, tree,
//! commit, ref, and pull-request primitives; this module fixes that
//! boundary as the [`RepoGateway`] trait plus a concrete GitHub adapter.
//! The orchestrator expects each operation to return the expected object
//! shape or raise a typed failure; it never retries gateway calls.

pub mod github;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use github::{GithubGateway, GithubSettings};

/// A file fetched from the repository at the base branch head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
    /// Blob sha of the fetched revision
    pub sha: String,
}

/// Head of a branch: the commit plus the tree it points at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchHead {
    pub commit_sha: String,
    pub tree_sha: String,
}

/// One entry of a tree write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub blob_sha: String,
}

/// An opened pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("repository object not found: {0}")]
    NotFound(String),
    #[error("gateway call failed ({status}): {message}")]
    Failed { status: u16, message: String },
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("malformed gateway reply: {0}")]
    MalformedReply(String),
}

/// Blob/tree/commit/ref/PR primitives consumed by the orchestrator.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    /// Fetch a file's current content and blob sha from the base branch.
    async fn get_file(&self, path: &str) -> Result<RepoFile, GatewayError>;

    /// Resolve a branch to its head commit and tree.
    async fn branch_head(&self, branch: &str) -> Result<BranchHead, GatewayError>;

    /// Write a blob, returning its sha.
    async fn create_blob(&self, content: &str) -> Result<String, GatewayError>;

    /// Write a tree on top of a base tree, returning its sha.
    async fn create_tree(
        &self,
        base_tree_sha: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GatewayError>;

    /// Write a commit, returning its sha.
    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, GatewayError>;

    /// Point a branch ref at a commit, creating the ref when absent.
    async fn update_ref(&self, branch: &str, commit_sha: &str) -> Result<(), GatewayError>;

    /// Open a pull request from `head` into `base`.
    async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, GatewayError>;
}
