//! Gatus status-page adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::telemetry::{EndpointStatus, StatusPage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GatusClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatusClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn parse_endpoint(endpoint: &Value) -> EndpointStatus {
    let name = endpoint["name"].as_str().unwrap_or_default().to_string();
    let group = endpoint["group"].as_str().unwrap_or_default().to_string();
    let results = endpoint["results"].as_array().cloned().unwrap_or_default();
    let last = results.last();

    let healthy = last
        .and_then(|r| r["success"].as_bool())
        .unwrap_or(false);
    let last_check = last
        .and_then(|r| r["timestamp"].as_str())
        .unwrap_or_default()
        .to_string();
    let successes = results
        .iter()
        .filter(|r| r["success"].as_bool().unwrap_or(false))
        .count();
    let uptime_7d = if results.is_empty() {
        0.0
    } else {
        successes as f64 / results.len() as f64 * 100.0
    };

    EndpointStatus {
        name,
        group,
        healthy,
        uptime_7d: (uptime_7d * 100.0).round() / 100.0,
        last_check,
    }
}

#[async_trait]
impl StatusPage for GatusClient {
    async fn endpoint_statuses(&self) -> GuardianResult<Vec<EndpointStatus>> {
        let response = self
            .http
            .get(format!("{}/api/v1/endpoints/statuses", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("gatus", e.to_string()))?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "gatus",
                format!("HTTP {}", response.status()),
            ));
        }
        let body: Vec<Value> = response.json().await?;
        Ok(body.iter().map(parse_endpoint).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_status_parsing() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            {
                "name": "plex",
                "group": "media",
                "results": [
                    {"success": true, "timestamp": "2025-01-01T00:00:00Z"},
                    {"success": false, "timestamp": "2025-01-01T00:05:00Z"}
                ]
            },
            {"name": "empty", "group": "misc", "results": []}
        ]);
        let _mock = server
            .mock("GET", "/api/v1/endpoints/statuses")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let statuses = GatusClient::new(&server.url())
            .endpoint_statuses()
            .await
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "plex");
        assert!(!statuses[0].healthy, "last result wins");
        assert!((statuses[0].uptime_7d - 50.0).abs() < 1e-9);
        assert!(!statuses[1].healthy);
        assert!((statuses[1].uptime_7d - 0.0).abs() < 1e-9);
    }
}
