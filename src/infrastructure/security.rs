//! CrowdSec adapter for the runtime-security port.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::telemetry::{BanDecision, SecurityAlert, SecurityBackend};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CrowdSecClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CrowdSecClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> GuardianResult<Value> {
        let mut request = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .timeout(REQUEST_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("crowdsec", e.to_string()))?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "crowdsec",
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SecurityBackend for CrowdSecClient {
    async fn ban_decisions(&self) -> GuardianResult<Vec<BanDecision>> {
        let body = self
            .get_json("/v1/decisions", &[("type", "ban".to_string())])
            .await?;
        let decisions = body.as_array().cloned().unwrap_or_default();
        Ok(decisions
            .into_iter()
            .map(|d| BanDecision {
                value: d["value"].as_str().unwrap_or_default().to_string(),
                scope: d["scope"].as_str().unwrap_or_default().to_string(),
                reason: d["scenario"].as_str().unwrap_or_default().to_string(),
                duration: d["duration"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn recent_alerts(&self, limit: usize) -> GuardianResult<Vec<SecurityAlert>> {
        let body = self
            .get_json("/v1/alerts", &[("limit", limit.to_string())])
            .await?;
        let alerts = body.as_array().cloned().unwrap_or_default();
        Ok(alerts
            .into_iter()
            .map(|a| SecurityAlert {
                scenario: a["scenario"].as_str().unwrap_or_default().to_string(),
                source_ip: a["source"]["ip"].as_str().unwrap_or_default().to_string(),
                created_at: a["created_at"].as_str().unwrap_or_default().to_string(),
                events_count: a["events_count"].as_u64().unwrap_or(0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ban_decisions_parsing() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            {"value": "203.0.113.9", "scope": "Ip", "scenario": "ssh-bruteforce", "duration": "3h59m"}
        ]);
        let _mock = server
            .mock("GET", "/v1/decisions")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let decisions = CrowdSecClient::new(&server.url(), Some("key".into()))
            .ban_decisions()
            .await
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].value, "203.0.113.9");
        assert_eq!(decisions[0].reason, "ssh-bruteforce");
    }
}
