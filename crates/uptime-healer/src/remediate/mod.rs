//! Automated remediation: apply a diagnosis as a branch and pull request.
//!
//! Each run clones the target repository into a throwaway workspace, writes
//! the generated files on a fresh `fix/website-downtime-<ts>` branch, pushes
//! it and opens a pull request against the default branch. The workspace is
//! removed whatever the outcome. A per-repository lock file keeps two
//! processes from remediating the same repository at once.

pub mod git;
pub mod github;
pub mod lock;
pub mod templates;

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{env_var, ConfigError};
use crate::diagnose::Diagnosis;
use git::Git;
use github::{GitHubClient, NewPullRequest, GITHUB_API_URL};
use lock::{RemediationLock, STALE_AFTER};
use templates::{commit_message, PullRequestContext, TemplateEngine};

/// Remediation failures.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Remediation already running for {repo}")]
    AlreadyRunning { repo: String },

    #[error("Diagnosis has no fixes to apply")]
    NoFixes,

    #[error("Refusing to write outside the checkout: {0}")]
    UnsafePath(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("GitHub API error ({status}): {message}")]
    GitHub { status: u16, message: String },

    #[error("GitHub token contains invalid header characters")]
    InvalidToken,

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template error: {0}")]
    Template(String),
}

impl RemediationError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Pull request opened by a successful remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
    pub branch: String,
}

/// The downtime that triggered remediation.
#[derive(Debug, Clone)]
pub struct DowntimeContext {
    pub url: String,
    pub error_detail: String,
    pub down_count: u32,
}

/// Applies a diagnosis to the target repository.
#[async_trait]
pub trait Remediator: Send + Sync {
    async fn remediate(
        &self,
        diagnosis: &Diagnosis,
        downtime: &DowntimeContext,
    ) -> Result<PullRequestRef, RemediationError>;
}

/// Target repository and git identity.
#[derive(Clone)]
pub struct RemediationConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub api_url: String,
    /// Overrides the token-bearing `https://github.com/...` clone URL.
    pub clone_url: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub work_root: PathBuf,
}

impl std::fmt::Debug for RemediationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"***")
            .field("api_url", &self.api_url)
            .field("work_root", &self.work_root)
            .finish_non_exhaustive()
    }
}

impl RemediationConfig {
    #[must_use]
    pub fn new(token: &str, owner: &str, repo: &str, work_root: impl Into<PathBuf>) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
            api_url: GITHUB_API_URL.to_string(),
            clone_url: None,
            author_name: "uptime-healer".to_string(),
            author_email: "uptime-healer@users.noreply.github.com".to_string(),
            work_root: work_root.into(),
        }
    }

    /// Read `GITHUB_*` / `GIT_AUTHOR_*` settings.
    ///
    /// Returns `Ok(None)` when none of token, owner and repo are set, and an
    /// error when only some of them are.
    pub fn from_env(work_root: impl Into<PathBuf>) -> Result<Option<Self>, ConfigError> {
        let token = env_var("GITHUB_TOKEN");
        let owner = env_var("GITHUB_REPO_OWNER");
        let repo = env_var("GITHUB_REPO_NAME");

        let (token, owner, repo) = match (token, owner, repo) {
            (None, None, None) => return Ok(None),
            (Some(t), Some(o), Some(r)) => (t, o, r),
            (None, _, _) => {
                return Err(ConfigError::Incomplete {
                    present: "GITHUB_REPO_OWNER/GITHUB_REPO_NAME",
                    missing: "GITHUB_TOKEN",
                })
            }
            (Some(_), None, _) => {
                return Err(ConfigError::Incomplete {
                    present: "GITHUB_TOKEN",
                    missing: "GITHUB_REPO_OWNER",
                })
            }
            (Some(_), Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: "GITHUB_TOKEN",
                    missing: "GITHUB_REPO_NAME",
                })
            }
        };

        let mut config = Self::new(&token, &owner, &repo, work_root);
        if let Some(api_url) = env_var("GITHUB_API_URL") {
            config.api_url = api_url;
        }
        config.clone_url = env_var("GITHUB_CLONE_URL");
        if let Some(name) = env_var("GIT_AUTHOR_NAME") {
            config.author_name = name;
        }
        if let Some(email) = env_var("GIT_AUTHOR_EMAIL") {
            config.author_email = email;
        }
        Ok(Some(config))
    }

    /// `owner/repo`
    #[must_use]
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Lock and workspace key.
    #[must_use]
    pub fn repo_key(&self) -> String {
        format!("{}-{}", self.owner, self.repo)
    }

    /// Clone URL with the token embedded.
    #[must_use]
    pub fn clone_url(&self) -> String {
        self.clone_url.clone().unwrap_or_else(|| {
            format!(
                "https://x-access-token:{}@github.com/{}/{}.git",
                self.token, self.owner, self.repo
            )
        })
    }
}

/// Remediator backed by the `git` CLI and the GitHub REST API.
pub struct GitRemediator {
    config: RemediationConfig,
    git: Git,
    github: GitHubClient,
    templates: TemplateEngine<'static>,
}

impl GitRemediator {
    pub fn new(config: RemediationConfig) -> Result<Self, RemediationError> {
        let git = Git::new(&config.author_name, &config.author_email).with_secret(&config.token);
        let github = GitHubClient::new(&config.token, &config.api_url, &config.owner, &config.repo)?;
        Ok(Self {
            config,
            git,
            github,
            templates: TemplateEngine::new()?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    async fn apply(
        &self,
        workspace: &Path,
        branch: &str,
        diagnosis: &Diagnosis,
        downtime: &DowntimeContext,
    ) -> Result<PullRequestRef, RemediationError> {
        info!(repo = %self.config.repo_path(), workspace = %workspace.display(), "Cloning repository");
        self.git.clone_repo(&self.config.clone_url(), workspace).await?;
        self.git.checkout_new_branch(workspace, branch).await?;

        for fix in &diagnosis.fixes {
            let dest = checkout_path(workspace, &fix.file_path)?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RemediationError::io(format!("Failed to create {}", parent.display()), e))?;
            }
            tokio::fs::write(&dest, &fix.generated_content)
                .await
                .map_err(|e| RemediationError::io(format!("Failed to write {}", fix.file_path), e))?;
            info!(file = %fix.file_path, "Applied fix");
        }

        self.git.commit_all(workspace, &commit_message(diagnosis)).await?;
        self.git.push(workspace, branch).await?;
        info!(branch, "Pushed fix branch");

        let base = self.github.default_branch().await?;
        let title = format!(
            "🚨 Auto-Fix: Website Downtime Resolution - {}",
            Utc::now().format("%Y-%m-%d %H:%M")
        );
        let body = self
            .templates
            .render_pull_request(&PullRequestContext::new(diagnosis, downtime))?;

        let pr = self
            .github
            .create_pull_request(&NewPullRequest {
                title: &title,
                body: &body,
                head: branch,
                base: &base,
            })
            .await?;

        Ok(PullRequestRef {
            number: pr.number,
            url: pr.html_url,
            branch: branch.to_string(),
        })
    }
}

#[async_trait]
impl Remediator for GitRemediator {
    async fn remediate(
        &self,
        diagnosis: &Diagnosis,
        downtime: &DowntimeContext,
    ) -> Result<PullRequestRef, RemediationError> {
        if !diagnosis.has_fixes() {
            return Err(RemediationError::NoFixes);
        }

        let work_root = &self.config.work_root;
        let key = self.config.repo_key();
        let Some(_lock) = RemediationLock::acquire(work_root, &key, STALE_AFTER)
            .map_err(|e| RemediationError::io("Failed to take remediation lock", e))?
        else {
            warn!(repo = %self.config.repo_path(), "Remediation already in progress, skipping");
            return Err(RemediationError::AlreadyRunning {
                repo: self.config.repo_path(),
            });
        };

        let ts = Utc::now().timestamp();
        let workspace = work_root.join(format!("{key}-{ts}"));
        let branch = format!("fix/website-downtime-{ts}");

        let result = self.apply(&workspace, &branch, diagnosis, downtime).await;
        cleanup(&workspace).await;
        result
    }
}

/// Resolve a repository-relative path inside the checkout.
fn checkout_path(workspace: &Path, file: &str) -> Result<PathBuf, RemediationError> {
    let relative = Path::new(file);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || file.is_empty() {
        return Err(RemediationError::UnsafePath(file.to_string()));
    }
    Ok(workspace.join(relative))
}

/// Best-effort workspace removal.
async fn cleanup(workspace: &Path) {
    match tokio::fs::remove_dir_all(workspace).await {
        Ok(()) => info!(workspace = %workspace.display(), "Cleaned up workspace"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(workspace = %workspace.display(), error = %e, "Failed to clean up workspace"),
    }
}
