//! Prometheus adapter for the metrics-backend port.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::telemetry::{
    FiringAlert, LatencyQuantiles, MetricsBackend, ResourceUsage, VolumeUsage,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn instant_query(&self, promql: &str) -> GuardianResult<Value> {
        let response = self
            .http
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", promql)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("prometheus", e.to_string()))?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "prometheus",
                format!("query returned HTTP {}", response.status()),
            ));
        }
        let body: Value = response.json().await?;
        if body["status"] != "success" {
            return Err(GuardianError::unavailable(
                "prometheus",
                format!("query status {}", body["status"]),
            ));
        }
        Ok(body["data"]["result"].clone())
    }

    /// First sample value of an instant-query result vector.
    async fn scalar(&self, promql: &str) -> GuardianResult<Option<f64>> {
        let result = self.instant_query(promql).await?;
        Ok(extract_value(&result))
    }
}

fn extract_value(result: &Value) -> Option<f64> {
    result
        .as_array()?
        .first()?
        .get("value")?
        .as_array()?
        .get(1)?
        .as_str()?
        .parse()
        .ok()
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query(&self, promql: &str) -> GuardianResult<Value> {
        self.instant_query(promql).await
    }

    async fn firing_alerts(&self) -> GuardianResult<Vec<FiringAlert>> {
        let response = self
            .http
            .get(format!("{}/api/v1/alerts", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("prometheus", e.to_string()))?;
        let body: Value = response.json().await?;
        let alerts = body["data"]["alerts"].as_array().cloned().unwrap_or_default();

        Ok(alerts
            .into_iter()
            .filter(|a| a["state"] == "firing")
            .map(|a| {
                let labels: HashMap<String, String> = a["labels"]
                    .as_object()
                    .map(|o| {
                        o.iter()
                            .filter_map(|(k, v)| {
                                v.as_str().map(|s| (k.clone(), s.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let name = labels
                    .get("alertname")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                let summary = a["annotations"]["summary"]
                    .as_str()
                    .or_else(|| a["annotations"]["description"].as_str())
                    .unwrap_or_default()
                    .to_string();
                FiringAlert {
                    name,
                    severity: labels.get("severity").cloned(),
                    summary,
                    labels,
                }
            })
            .collect())
    }

    async fn pod_cpu(&self, namespace: &str, pod: &str) -> GuardianResult<ResourceUsage> {
        let current = self
            .scalar(&format!(
                "sum(rate(container_cpu_usage_seconds_total{{namespace=\"{namespace}\",pod=\"{pod}\"}}[5m]))"
            ))
            .await?
            .unwrap_or(0.0);
        let request = self
            .scalar(&format!(
                "sum(kube_pod_container_resource_requests{{namespace=\"{namespace}\",pod=\"{pod}\",resource=\"cpu\"}})"
            ))
            .await?;
        let limit = self
            .scalar(&format!(
                "sum(kube_pod_container_resource_limits{{namespace=\"{namespace}\",pod=\"{pod}\",resource=\"cpu\"}})"
            ))
            .await?;
        Ok(ResourceUsage {
            current,
            request,
            limit,
            unit: "cores".to_string(),
        })
    }

    async fn pod_memory(&self, namespace: &str, pod: &str) -> GuardianResult<ResourceUsage> {
        let current = self
            .scalar(&format!(
                "sum(container_memory_working_set_bytes{{namespace=\"{namespace}\",pod=\"{pod}\"}})"
            ))
            .await?
            .unwrap_or(0.0);
        let request = self
            .scalar(&format!(
                "sum(kube_pod_container_resource_requests{{namespace=\"{namespace}\",pod=\"{pod}\",resource=\"memory\"}})"
            ))
            .await?;
        let limit = self
            .scalar(&format!(
                "sum(kube_pod_container_resource_limits{{namespace=\"{namespace}\",pod=\"{pod}\",resource=\"memory\"}})"
            ))
            .await?;
        Ok(ResourceUsage {
            current,
            request,
            limit,
            unit: "bytes".to_string(),
        })
    }

    async fn service_error_rate(
        &self,
        namespace: &str,
        service: &str,
        window: &str,
    ) -> GuardianResult<f64> {
        let errors = self
            .scalar(&format!(
                "sum(rate(http_requests_total{{namespace=\"{namespace}\",service=\"{service}\",code=~\"5..\"}}[{window}]))"
            ))
            .await?
            .unwrap_or(0.0);
        let total = self
            .scalar(&format!(
                "sum(rate(http_requests_total{{namespace=\"{namespace}\",service=\"{service}\"}}[{window}]))"
            ))
            .await?
            .unwrap_or(0.0);
        if total <= 0.0 {
            Ok(0.0)
        } else {
            Ok(errors / total)
        }
    }

    async fn request_latency(
        &self,
        namespace: &str,
        service: &str,
        window: &str,
    ) -> GuardianResult<LatencyQuantiles> {
        let quantile = |q: f64| {
            format!(
                "histogram_quantile({q}, sum(rate(http_request_duration_seconds_bucket{{namespace=\"{namespace}\",service=\"{service}\"}}[{window}])) by (le)) * 1000"
            )
        };
        Ok(LatencyQuantiles {
            p50_ms: self.scalar(&quantile(0.5)).await?,
            p95_ms: self.scalar(&quantile(0.95)).await?,
            p99_ms: self.scalar(&quantile(0.99)).await?,
        })
    }

    async fn volume_usage(&self) -> GuardianResult<Vec<VolumeUsage>> {
        let result = self
            .instant_query(
                "100 * kubelet_volume_stats_used_bytes / kubelet_volume_stats_capacity_bytes",
            )
            .await?;
        Ok(result
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let metric = row.get("metric")?;
                        let usage: f64 = row.get("value")?.as_array()?.get(1)?.as_str()?.parse().ok()?;
                        Some(VolumeUsage {
                            namespace: metric["namespace"].as_str().unwrap_or("").to_string(),
                            claim: metric["persistentvolumeclaim"]
                                .as_str()
                                .unwrap_or("")
                                .to_string(),
                            usage_percent: usage,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn available(&self) -> bool {
        self.http
            .get(format!("{}/-/healthy", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
