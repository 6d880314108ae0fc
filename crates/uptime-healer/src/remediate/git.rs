//! Thin wrapper over the `git` CLI.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use super::RemediationError;

/// Runs git commands with a fixed commit identity.
#[derive(Debug, Clone)]
pub struct Git {
    author_name: String,
    author_email: String,
    /// Redacted from any error output (the clone URL may embed a token).
    secret: Option<String>,
}

impl Git {
    #[must_use]
    pub fn new(author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            author_name: author_name.into(),
            author_email: author_email.into(),
            secret: None,
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), RemediationError> {
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", "--quiet", url, &dest]).await?;
        Ok(())
    }

    pub async fn checkout_new_branch(&self, repo: &Path, branch: &str) -> Result<(), RemediationError> {
        self.run(Some(repo), &["checkout", "--quiet", "-b", branch]).await?;
        Ok(())
    }

    /// Stage everything and commit.
    pub async fn commit_all(&self, repo: &Path, message: &str) -> Result<(), RemediationError> {
        self.run(Some(repo), &["add", "-A"]).await?;

        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.run(
            Some(repo),
            &[
                "-c",
                &name,
                "-c",
                &email,
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                message,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn push(&self, repo: &Path, branch: &str) -> Result<(), RemediationError> {
        self.run(Some(repo), &["push", "--quiet", "-u", "origin", branch]).await?;
        Ok(())
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, RemediationError> {
        // First non-flag argument names the command in errors; never the URL.
        let command = format!(
            "git {}",
            args.iter().find(|a| !a.starts_with('-') && !a.contains('=')).unwrap_or(&"")
        );
        debug!(command = %command, dir = ?dir, "Running git");

        let mut cmd = Command::new("git");
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| RemediationError::Git {
            command: command.clone(),
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RemediationError::Git {
                command,
                stderr: self.redact(&stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn redact(&self, text: &str) -> String {
        match &self.secret {
            Some(secret) => text.replace(secret.as_str(), "***"),
            None => text.to_string(),
        }
    }
}
