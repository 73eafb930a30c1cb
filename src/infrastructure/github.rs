//! GitHub adapter for the forge port: branch + file + pull request.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::models::config::Config;
use crate::domain::ports::pipeline::Forge;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const API_BASE: &str = "https://api.github.com";

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    owner: String,
    repo: String,
    base_branch: String,
}

impl GithubClient {
    /// Returns None when no token is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let token = config.github_token.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            token,
            owner: config.github_owner.clone(),
            repo: config.github_repo.clone(),
            base_branch: config.github_base_branch.clone(),
        })
    }

    #[cfg(test)]
    fn for_tests(api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.to_string(),
            token: "test-token".to_string(),
            owner: "owner".to_string(),
            repo: "repo".to_string(),
            base_branch: "main".to_string(),
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{path}",
            self.api_base, self.owner, self.repo
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "cluster-guardian")
            .timeout(REQUEST_TIMEOUT)
    }

    async fn check(response: reqwest::Response) -> GuardianResult<Value> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body)
        } else {
            Err(GuardianError::Api {
                status: status.as_u16(),
                message: body["message"].as_str().unwrap_or("forge error").to_string(),
            })
        }
    }

    async fn base_sha(&self) -> GuardianResult<String> {
        let body = Self::check(
            self.request(
                reqwest::Method::GET,
                self.repo_url(&format!("/git/ref/heads/{}", self.base_branch)),
            )
            .send()
            .await?,
        )
        .await?;
        body["object"]["sha"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| GuardianError::Other("base branch has no sha".to_string()))
    }
}

#[async_trait]
impl Forge for GithubClient {
    async fn create_fix_pr(
        &self,
        title: &str,
        body: &str,
        branch: &str,
        file_path: &str,
        file_content: &str,
    ) -> GuardianResult<String> {
        let sha = self.base_sha().await?;

        // Create the branch from the base head.
        Self::check(
            self.request(reqwest::Method::POST, self.repo_url("/git/refs"))
                .json(&json!({"ref": format!("refs/heads/{branch}"), "sha": sha}))
                .send()
                .await?,
        )
        .await?;

        // Commit the file onto the branch.
        let encoded = base64::engine::general_purpose::STANDARD.encode(file_content.as_bytes());
        Self::check(
            self.request(
                reqwest::Method::PUT,
                self.repo_url(&format!("/contents/{file_path}")),
            )
            .json(&json!({
                "message": title,
                "content": encoded,
                "branch": branch,
            }))
            .send()
            .await?,
        )
        .await?;

        // Open the pull request.
        let pr = Self::check(
            self.request(reqwest::Method::POST, self.repo_url("/pulls"))
                .json(&json!({
                    "title": title,
                    "body": body,
                    "head": branch,
                    "base": self.base_branch,
                }))
                .send()
                .await?,
        )
        .await?;

        pr["html_url"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| GuardianError::Other("pull request has no url".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_fix_pr_flow() {
        let mut server = mockito::Server::new_async().await;
        let _ref = server
            .mock("GET", "/repos/owner/repo/git/ref/heads/main")
            .with_status(200)
            .with_body(r#"{"object": {"sha": "abc123"}}"#)
            .create_async()
            .await;
        let _branch = server
            .mock("POST", "/repos/owner/repo/git/refs")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let _file = server
            .mock("PUT", "/repos/owner/repo/contents/manifests/web.yaml")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let _pr = server
            .mock("POST", "/repos/owner/repo/pulls")
            .with_status(201)
            .with_body(r#"{"html_url": "https://github.com/owner/repo/pull/42"}"#)
            .create_async()
            .await;

        let url = GithubClient::for_tests(&server.url())
            .create_fix_pr(
                "Raise memory limit",
                "OOMKilled repeatedly",
                "guardian/fix-web",
                "manifests/web.yaml",
                "memory: 512Mi",
            )
            .await
            .unwrap();
        assert_eq!(url, "https://github.com/owner/repo/pull/42");
    }
}
