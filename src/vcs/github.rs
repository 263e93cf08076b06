//! GitHub REST adapter for the repository gateway.

use crate::vcs::{BranchHead, GatewayError, PullRequest, RepoFile, RepoGateway, TreeEntry};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Connection settings for one repository
#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub base_branch: String,
    /// Override for GitHub Enterprise or test servers
    pub api_base: Option<String>,
    pub request_timeout: std::time::Duration,
}

pub struct GithubGateway {
    client: reqwest::Client,
    settings: GithubSettings,
    api_base: String,
}

impl GithubGateway {
    pub fn new(settings: GithubSettings) -> Result<Self, GatewayError> {
        if settings.token.is_empty() {
            return Err(GatewayError::Failed {
                status: 401,
                message: "repository token is not configured".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;
        let api_base = settings
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            settings,
            api_base,
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.settings.owner, self.settings.repo, tail
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.settings.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", concat!("amend/", env!("CARGO_PKG_VERSION")))
    }

    async fn read_reply<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            return Err(GatewayError::Failed {
                status: status.as_u16(),
                message: extract_message(&body),
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::MalformedReply(format!("{}: {}", what, e)))
    }
}

fn extract_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        message: Option<String>,
    }
    if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
        if let Some(message) = envelope.message {
            return message;
        }
    }
    let mut trimmed = body.trim().to_string();
    trimmed.truncate(200);
    trimmed
}

#[derive(Deserialize)]
struct ContentsReply {
    content: String,
    sha: String,
    encoding: String,
}

#[derive(Deserialize)]
struct ShaReply {
    sha: String,
}

#[derive(Deserialize)]
struct RefReply {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct CommitReply {
    tree: ShaReply,
}

#[derive(Deserialize)]
struct PullReply {
    number: u64,
    html_url: String,
}

#[async_trait]
impl RepoGateway for GithubGateway {
    async fn get_file(&self, path: &str) -> Result<RepoFile, GatewayError> {
        let url = format!(
            "{}?ref={}",
            self.repo_url(&format!("contents/{}", path)),
            self.settings.base_branch
        );
        let reply: ContentsReply = Self::read_reply(
            self.request(reqwest::Method::GET, url)
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            path,
        )
        .await?;

        if reply.encoding != "base64" {
            return Err(GatewayError::MalformedReply(format!(
                "unexpected content encoding '{}'",
                reply.encoding
            )));
        }
        let raw: String = reply.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|e| GatewayError::MalformedReply(format!("content decode: {}", e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|e| GatewayError::MalformedReply(format!("content is not utf-8: {}", e)))?;

        debug!(path, sha = %reply.sha, bytes = content.len(), "fetched file");
        Ok(RepoFile {
            path: path.to_string(),
            content,
            sha: reply.sha,
        })
    }

    async fn branch_head(&self, branch: &str) -> Result<BranchHead, GatewayError> {
        let ref_url = self.repo_url(&format!("git/ref/heads/{}", branch));
        let reply: RefReply = Self::read_reply(
            self.request(reqwest::Method::GET, ref_url)
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            branch,
        )
        .await?;
        let commit_sha = reply.object.sha;

        let commit_url = self.repo_url(&format!("git/commits/{}", commit_sha));
        let commit: CommitReply = Self::read_reply(
            self.request(reqwest::Method::GET, commit_url)
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            &commit_sha,
        )
        .await?;

        Ok(BranchHead {
            commit_sha,
            tree_sha: commit.tree.sha,
        })
    }

    async fn create_blob(&self, content: &str) -> Result<String, GatewayError> {
        let reply: ShaReply = Self::read_reply(
            self.request(reqwest::Method::POST, self.repo_url("git/blobs"))
                .json(&json!({ "content": content, "encoding": "utf-8" }))
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            "blob",
        )
        .await?;
        Ok(reply.sha)
    }

    async fn create_tree(
        &self,
        base_tree_sha: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GatewayError> {
        let tree: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "path": entry.path,
                    "mode": "100644",
                    "type": "blob",
                    "sha": entry.blob_sha,
                })
            })
            .collect();
        let reply: ShaReply = Self::read_reply(
            self.request(reqwest::Method::POST, self.repo_url("git/trees"))
                .json(&json!({ "base_tree": base_tree_sha, "tree": tree }))
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            "tree",
        )
        .await?;
        Ok(reply.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, GatewayError> {
        let reply: ShaReply = Self::read_reply(
            self.request(reqwest::Method::POST, self.repo_url("git/commits"))
                .json(&json!({ "message": message, "tree": tree_sha, "parents": parents }))
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            "commit",
        )
        .await?;
        Ok(reply.sha)
    }

    async fn update_ref(&self, branch: &str, commit_sha: &str) -> Result<(), GatewayError> {
        // Try a fast-forward update first; create the ref when it is absent.
        let patch = self
            .request(
                reqwest::Method::PATCH,
                self.repo_url(&format!("git/refs/heads/{}", branch)),
            )
            .json(&json!({ "sha": commit_sha, "force": false }))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;

        if patch.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || patch.status() == reqwest::StatusCode::NOT_FOUND
        {
            let _: serde_json::Value = Self::read_reply(
                self.request(reqwest::Method::POST, self.repo_url("git/refs"))
                    .json(&json!({
                        "ref": format!("refs/heads/{}", branch),
                        "sha": commit_sha,
                    }))
                    .send()
                    .await
                    .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
                branch,
            )
            .await?;
            return Ok(());
        }

        let _: serde_json::Value = Self::read_reply(patch, branch).await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, GatewayError> {
        let reply: PullReply = Self::read_reply(
            self.request(reqwest::Method::POST, self.repo_url("pulls"))
                .json(&json!({ "title": title, "head": head, "base": base, "body": body }))
                .send()
                .await
                .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?,
            "pull request",
        )
        .await?;
        Ok(PullRequest {
            number: reply.number,
            url: reply.html_url,
        })
    }
}
