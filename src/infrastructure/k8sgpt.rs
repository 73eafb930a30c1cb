//! K8sGPT analysis-helper adapter (HTTP transport).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::pipeline::{AnalyzerIssue, ClusterAnalyzer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct K8sGptClient {
    http: reqwest::Client,
    base_url: String,
}

impl K8sGptClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ClusterAnalyzer for K8sGptClient {
    async fn issues(&self) -> GuardianResult<Vec<AnalyzerIssue>> {
        let response = self
            .http
            .get(format!("{}/v1/analyze", self.base_url))
            .query(&[("explain", "false")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("k8sgpt", e.to_string()))?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "k8sgpt",
                format!("HTTP {}", response.status()),
            ));
        }
        let body: Value = response.json().await?;
        let results = body["results"].as_array().cloned().unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|result| {
                let errors = result["error"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|e| e["Text"].as_str().or_else(|| e["text"].as_str()))
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .unwrap_or_default();
                AnalyzerIssue {
                    kind: result["kind"].as_str().unwrap_or_default().to_string(),
                    name: result["name"].as_str().unwrap_or_default().to_string(),
                    error: errors,
                    details: result["details"].as_str().unwrap_or_default().to_string(),
                }
            })
            .collect())
    }

    async fn available(&self) -> bool {
        self.http
            .get(format!("{}/healthz", self.base_url))
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
    async fn test_analyze_parsing() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "results": [{
                "kind": "Pod",
                "name": "default/web-1",
                "error": [{"Text": "the last termination reason is OOMKilled"}],
                "details": ""
            }]
        });
        let _mock = server
            .mock("GET", "/v1/analyze")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let issues = K8sGptClient::new(&server.url()).issues().await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, "Pod");
        assert!(issues[0].error.contains("OOMKilled"));
    }
}
