//! GitHub REST client for the pull-request half of remediation.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::RemediationError;

pub const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct Repository {
    default_branch: String,
}

/// Request to open a pull request.
#[derive(Debug, Serialize)]
pub struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

/// Pull request as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// GitHub API client for one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(token: &str, api_url: &str, owner: &str, repo: &str) -> Result<Self, RemediationError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("uptime-healer/", env!("CARGO_PKG_VERSION"))),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RemediationError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// `owner/repo`
    #[must_use]
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Name of the repository's default branch.
    pub async fn default_branch(&self) -> Result<String, RemediationError> {
        let url = format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemediationError::GitHub { status, message: body });
        }

        let repo: Repository = response.json().await?;
        debug!(repo = %self.repo_path(), default_branch = %repo.default_branch, "Resolved default branch");
        Ok(repo.default_branch)
    }

    /// Open a pull request.
    pub async fn create_pull_request(&self, request: &NewPullRequest<'_>) -> Result<PullRequest, RemediationError> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, self.owner, self.repo);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemediationError::GitHub { status, message: body });
        }

        let pr: PullRequest = response.json().await?;
        info!(repo = %self.repo_path(), pr_number = pr.number, pr_url = %pr.html_url, "Created pull request");
        Ok(pr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_default_branch_and_pull_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/site"))
            .and(header("authorization", "Bearer ghp_test"))
            .and(header("x-github-api-version", "2022-11-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"default_branch": "trunk"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/site/pulls"))
            .and(body_partial_json(json!({"head": "fix/x", "base": "trunk"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": 42,
                "html_url": "https://github.com/acme/site/pull/42"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new("ghp_test", &server.uri(), "acme", "site").unwrap();
        let base = client.default_branch().await.unwrap();
        assert_eq!(base, "trunk");

        let pr = client
            .create_pull_request(&NewPullRequest {
                title: "t",
                body: "b",
                head: "fix/x",
                base: &base,
            })
            .await
            .unwrap();
        assert_eq!(pr.number, 42);
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let client = GitHubClient::new("t", &server.uri(), "acme", "gone").unwrap();
        let err = client.default_branch().await.unwrap_err();
        assert!(matches!(err, RemediationError::GitHub { status: 404, .. }));
    }
}
