//! HTTP adapter for the long-term-fix pipeline.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::error;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::pipeline::FixPipeline;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct DevControllerClient {
    http: reqwest::Client,
    base_url: String,
}

impl DevControllerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FixPipeline for DevControllerClient {
    async fn submit_goal(
        &self,
        description: &str,
        acceptance_criteria: &[String],
    ) -> GuardianResult<Value> {
        let payload = json!({
            "description": description,
            "acceptance_criteria": acceptance_criteria,
            "source": "cluster-guardian",
        });
        let response = self
            .http
            .post(format!("{}/dev-loop/goals", self.base_url))
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "goal submission failed");
                GuardianError::unavailable("dev-controller", e.to_string())
            })?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "dev-controller",
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response.json().await?)
    }

    async fn loop_status(&self) -> GuardianResult<Value> {
        let response = self
            .http
            .get(format!("{}/dev-loop/status", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("dev-controller", e.to_string()))?;
        Ok(response.json().await?)
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_goal_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/dev-loop/goals")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "source": "cluster-guardian",
            })))
            .with_status(200)
            .with_body(r#"{"goal_id": "g-7"}"#)
            .create_async()
            .await;

        let result = DevControllerClient::new(&server.url())
            .submit_goal("fix crashloop", &["no longer recurs".to_string()])
            .await
            .unwrap();
        assert_eq!(result["goal_id"], "g-7");
    }
}
