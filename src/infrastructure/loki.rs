//! Loki adapter for the log-backend port.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::telemetry::{LogBackend, NamespaceErrorCount};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_LINE_CHARS: usize = 500;

pub struct LokiClient {
    http: reqwest::Client,
    base_url: String,
}

impl LokiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn query_range(&self, logql: &str, since: &str, limit: u32) -> GuardianResult<Value> {
        let start_ns = start_nanos(since);
        let response = self
            .http
            .get(format!("{}/loki/api/v1/query_range", self.base_url))
            .query(&[
                ("query", logql),
                ("limit", &limit.to_string()),
                ("start", &start_ns.to_string()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("loki", e.to_string()))?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "loki",
                format!("query returned HTTP {}", response.status()),
            ));
        }
        Ok(response.json().await?)
    }

    async fn query_lines(&self, logql: &str, since: &str, limit: u32) -> GuardianResult<String> {
        let body = self.query_range(logql, since, limit).await?;
        Ok(format_entries(&body))
    }
}

/// Convert a lookback like "1h" / "30m" / "90s" to absolute unix nanos.
fn start_nanos(since: &str) -> i128 {
    let now_ns = i128::from(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));
    let trimmed = since.trim();
    let (value, unit) = trimmed.split_at(trimmed.len().saturating_sub(1));
    let seconds: i128 = match (value.parse::<i128>(), unit) {
        (Ok(v), "s") => v,
        (Ok(v), "m") => v * 60,
        (Ok(v), "h") => v * 3600,
        (Ok(v), "d") => v * 86_400,
        _ => 3600,
    };
    now_ns - seconds * 1_000_000_000
}

fn truncate_line(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
        format!("{cut}...")
    }
}

/// Flatten a query_range response into one log line per row, oldest first.
fn format_entries(body: &Value) -> String {
    let mut lines: Vec<(String, String)> = Vec::new();
    if let Some(streams) = body["data"]["result"].as_array() {
        for stream in streams {
            if let Some(values) = stream["values"].as_array() {
                for entry in values {
                    if let (Some(ts), Some(line)) = (
                        entry.get(0).and_then(Value::as_str),
                        entry.get(1).and_then(Value::as_str),
                    ) {
                        lines.push((ts.to_string(), truncate_line(line)));
                    }
                }
            }
        }
    }
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    lines
        .into_iter()
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LogBackend for LokiClient {
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        since: &str,
        limit: u32,
    ) -> GuardianResult<String> {
        self.query_lines(
            &format!("{{namespace=\"{namespace}\", pod=\"{pod}\"}}"),
            since,
            limit,
        )
        .await
    }

    async fn namespace_errors(
        &self,
        namespace: &str,
        since: &str,
        limit: u32,
    ) -> GuardianResult<String> {
        self.query_lines(
            &format!("{{namespace=\"{namespace}\"}} |~ \"(?i)(error|exception|fatal|panic)\""),
            since,
            limit,
        )
        .await
    }

    async fn search(&self, query: &str, since: &str, limit: u32) -> GuardianResult<String> {
        let escaped = query.replace('"', "\\\"");
        self.query_lines(
            &format!("{{namespace=~\".+\"}} |= \"{escaped}\""),
            since,
            limit,
        )
        .await
    }

    async fn error_volume(&self, since: &str) -> GuardianResult<Vec<NamespaceErrorCount>> {
        let body = self
            .query_range(
                &format!(
                    "sum by (namespace) (count_over_time({{namespace=~\".+\"}} |~ \"(?i)(error|exception|fatal|panic)\" [{since}]))"
                ),
                since,
                1000,
            )
            .await?;

        let mut counts = Vec::new();
        if let Some(rows) = body["data"]["result"].as_array() {
            for row in rows {
                let namespace = row["metric"]["namespace"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                // Matrix rows carry the latest sample last.
                let count = row["values"]
                    .as_array()
                    .and_then(|values| values.last())
                    .and_then(|entry| entry.get(1))
                    .and_then(Value::as_str)
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0);
                if !namespace.is_empty() {
                    counts.push(NamespaceErrorCount {
                        namespace,
                        count: count as u64,
                    });
                }
            }
        }
        Ok(counts)
    }

    async fn available(&self) -> bool {
        self.http
            .get(format!("{}/ready", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
