//! Orchestrator API port.
//!
//! Read queries and mutation primitives against the cluster. Safety policy
//! (protected namespaces, approvals, rate limits) lives in the action
//! gateway, never here: these are raw operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::errors::GuardianResult;

/// A pod stuck in CrashLoopBackOff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashLoopPod {
    pub namespace: String,
    pub name: String,
    pub container: String,
    pub restart_count: u32,
}

/// Owner reference on a pod or replica set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSummary {
    pub namespace: String,
    pub name: String,
    pub phase: String,
    pub node: Option<String>,
    pub restart_count: u32,
    pub ready: bool,
    #[serde(default)]
    pub owner_refs: Vec<OwnerRef>,
}

impl PodSummary {
    pub fn is_daemonset_owned(&self) -> bool {
        self.owner_refs.iter().any(|r| r.kind == "DaemonSet")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub name: String,
    pub unschedulable: bool,
    pub conditions: Vec<NodeCondition>,
}

impl NodeSummary {
    /// True when the Ready condition is present and not "True".
    pub fn not_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status != "True")
    }

    /// Pressure conditions currently asserted on this node.
    pub fn pressures(&self) -> Vec<&NodeCondition> {
        self.conditions
            .iter()
            .filter(|c| {
                matches!(
                    c.kind.as_str(),
                    "MemoryPressure" | "DiskPressure" | "PIDPressure"
                ) && c.status == "True"
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub namespace: String,
    pub name: String,
    pub desired: i32,
    pub available: i32,
    pub ready: i32,
    /// Status of the Progressing condition, when reported.
    pub progressing: Option<bool>,
    #[serde(default)]
    pub condition_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSetSummary {
    pub namespace: String,
    pub name: String,
    pub desired: i32,
    pub ready: i32,
    pub unavailable: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub namespace: String,
    pub name: String,
    pub failed: i32,
    #[serde(default)]
    pub reason: String,
}

/// Replica set detail needed by deployment rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSetSummary {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub owner_refs: Vec<OwnerRef>,
    /// `deployment.kubernetes.io/revision` annotation, parsed.
    pub revision: i64,
    /// Raw pod template, re-patched into the deployment on rollback.
    pub template: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRoute {
    pub namespace: String,
    pub name: String,
    pub hosts: Vec<String>,
    pub tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub namespace: String,
    pub name: String,
    pub cluster_ip: Option<String>,
    pub ports: Vec<i32>,
    pub endpoints_ready: i32,
}

/// cert-manager Certificate status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub namespace: String,
    pub name: String,
    pub ready: bool,
    #[serde(default)]
    pub message: String,
    pub days_until_expiry: Option<f64>,
}

/// An event from the orchestrator event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub namespace: String,
    /// "Normal" or "Warning" (some distributions also emit "Error").
    pub kind: String,
    pub reason: String,
    pub message: String,
    pub involved_kind: String,
    pub involved_name: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn involved(&self) -> String {
        if self.involved_kind.is_empty() && self.involved_name.is_empty() {
            String::new()
        } else {
            format!("{}/{}", self.involved_kind, self.involved_name)
        }
    }
}

/// Result of a scale operation, echoed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadScale {
    pub namespace: String,
    pub name: String,
    pub previous_replicas: i32,
    pub replicas: i32,
}

/// Port trait for the orchestrator API.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    // Reads
    async fn list_crashloop_pods(&self) -> GuardianResult<Vec<CrashLoopPod>>;
    async fn list_pods(&self, namespace: Option<&str>) -> GuardianResult<Vec<PodSummary>>;
    async fn get_pod(&self, namespace: &str, name: &str) -> GuardianResult<PodSummary>;
    async fn pods_on_node(&self, node: &str) -> GuardianResult<Vec<PodSummary>>;
    async fn list_nodes(&self) -> GuardianResult<Vec<NodeSummary>>;
    async fn list_deployments(
        &self,
        namespace: Option<&str>,
    ) -> GuardianResult<Vec<DeploymentSummary>>;
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> GuardianResult<DeploymentSummary>;
    async fn list_statefulsets(
        &self,
        namespace: Option<&str>,
    ) -> GuardianResult<Vec<DeploymentSummary>>;
    async fn list_daemonsets(&self) -> GuardianResult<Vec<DaemonSetSummary>>;
    async fn list_failed_jobs(&self) -> GuardianResult<Vec<JobSummary>>;
    async fn list_replicasets_for(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> GuardianResult<Vec<ReplicaSetSummary>>;
    async fn list_ingress_routes(&self) -> GuardianResult<Vec<IngressRoute>>;
    async fn list_services(&self, namespace: Option<&str>) -> GuardianResult<Vec<ServiceSummary>>;
    async fn list_hpas(&self, namespace: Option<&str>) -> GuardianResult<serde_json::Value>;
    async fn list_pdbs(&self, namespace: Option<&str>) -> GuardianResult<serde_json::Value>;
    async fn list_certificates(&self) -> GuardianResult<Vec<CertificateSummary>>;
    async fn recent_events(&self, namespace: Option<&str>) -> GuardianResult<Vec<EventRecord>>;
    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: Option<&str>,
        tail_lines: u32,
        previous: bool,
    ) -> GuardianResult<String>;

    /// Long-lived event watch. The stream ends when the server closes the
    /// watch; callers reconnect with back-off.
    async fn event_stream(&self)
        -> GuardianResult<BoxStream<'static, GuardianResult<EventRecord>>>;

    // Mutation primitives
    async fn delete_pod(&self, namespace: &str, name: &str) -> GuardianResult<()>;
    async fn rollout_restart_deployment(&self, namespace: &str, name: &str)
        -> GuardianResult<()>;
    async fn rollout_restart_statefulset(&self, namespace: &str, name: &str)
        -> GuardianResult<()>;
    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> GuardianResult<WorkloadScale>;
    async fn patch_deployment_template(
        &self,
        namespace: &str,
        name: &str,
        template: serde_json::Value,
    ) -> GuardianResult<()>;
    async fn delete_job(&self, namespace: &str, name: &str) -> GuardianResult<()>;
    async fn set_node_unschedulable(&self, name: &str, unschedulable: bool) -> GuardianResult<()>;
    async fn evict_pod(&self, namespace: &str, name: &str) -> GuardianResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemonset_owned() {
        let pod = PodSummary {
            namespace: "default".into(),
            name: "ds-node-exporter".into(),
            phase: "Running".into(),
            node: Some("node-1".into()),
            restart_count: 0,
            ready: true,
            owner_refs: vec![OwnerRef {
                kind: "DaemonSet".into(),
                name: "node-exporter".into(),
            }],
        };
        assert!(pod.is_daemonset_owned());
    }

    #[test]
    fn test_node_not_ready_and_pressures() {
        let node = NodeSummary {
            name: "node-1".into(),
            unschedulable: false,
            conditions: vec![
                NodeCondition {
                    kind: "Ready".into(),
                    status: "False".into(),
                    reason: "KubeletNotReady".into(),
                    message: String::new(),
                },
                NodeCondition {
                    kind: "MemoryPressure".into(),
                    status: "True".into(),
                    reason: String::new(),
                    message: String::new(),
                },
                NodeCondition {
                    kind: "DiskPressure".into(),
                    status: "False".into(),
                    reason: String::new(),
                    message: String::new(),
                },
            ],
        };
        assert!(node.not_ready());
        let pressures = node.pressures();
        assert_eq!(pressures.len(), 1);
        assert_eq!(pressures[0].kind, "MemoryPressure");
    }
}
