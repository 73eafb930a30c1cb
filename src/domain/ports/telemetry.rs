//! Telemetry ports: metrics backend, log backend, status page, and the
//! runtime-security backend.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::GuardianResult;

/// An alert currently firing in the metrics backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiringAlert {
    pub name: String,
    pub severity: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Current usage of a pod resource versus its request and limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub current: f64,
    pub request: Option<f64>,
    pub limit: Option<f64>,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyQuantiles {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

/// Persistent volume claim usage reported by kubelet metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeUsage {
    pub namespace: String,
    pub claim: String,
    pub usage_percent: f64,
}

#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Execute a raw instant query and return the result vector.
    async fn query(&self, promql: &str) -> GuardianResult<serde_json::Value>;
    async fn firing_alerts(&self) -> GuardianResult<Vec<FiringAlert>>;
    async fn pod_cpu(&self, namespace: &str, pod: &str) -> GuardianResult<ResourceUsage>;
    async fn pod_memory(&self, namespace: &str, pod: &str) -> GuardianResult<ResourceUsage>;
    async fn service_error_rate(
        &self,
        namespace: &str,
        service: &str,
        window: &str,
    ) -> GuardianResult<f64>;
    async fn request_latency(
        &self,
        namespace: &str,
        service: &str,
        window: &str,
    ) -> GuardianResult<LatencyQuantiles>;
    /// PVC usage across the cluster, as a percentage per claim.
    async fn volume_usage(&self) -> GuardianResult<Vec<VolumeUsage>>;
    async fn available(&self) -> bool;
}

/// Error counts per namespace over a rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceErrorCount {
    pub namespace: String,
    pub count: u64,
}

#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        since: &str,
        limit: u32,
    ) -> GuardianResult<String>;
    async fn namespace_errors(
        &self,
        namespace: &str,
        since: &str,
        limit: u32,
    ) -> GuardianResult<String>;
    async fn search(&self, query: &str, since: &str, limit: u32) -> GuardianResult<String>;
    /// Error volume per namespace, used by the log-spike detector.
    async fn error_volume(&self, since: &str) -> GuardianResult<Vec<NamespaceErrorCount>>;
    async fn available(&self) -> bool;
}

/// Health of one endpoint on the external status page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub name: String,
    pub group: String,
    pub healthy: bool,
    pub uptime_7d: f64,
    pub last_check: String,
}

#[async_trait]
pub trait StatusPage: Send + Sync {
    async fn endpoint_statuses(&self) -> GuardianResult<Vec<EndpointStatus>>;
}

/// An active ban decision from the runtime-security backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanDecision {
    pub value: String,
    pub scope: String,
    pub reason: String,
    pub duration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub scenario: String,
    pub source_ip: String,
    pub created_at: String,
    pub events_count: u64,
}

#[async_trait]
pub trait SecurityBackend: Send + Sync {
    async fn ban_decisions(&self) -> GuardianResult<Vec<BanDecision>>;
    async fn recent_alerts(&self, limit: usize) -> GuardianResult<Vec<SecurityAlert>>;
}
