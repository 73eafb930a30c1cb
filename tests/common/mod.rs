//! Shared test doubles: an in-memory cluster, a durable store, and a
//! scripted chat model.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;

use guardian::domain::errors::{GuardianError, GuardianResult};
use guardian::domain::models::action::{ActionRecord, ApprovalStatus, PendingApproval};
use guardian::domain::ports::cluster::{
    CertificateSummary, ClusterApi, CrashLoopPod, DaemonSetSummary, DeploymentSummary,
    EventRecord, IngressRoute, JobSummary, NodeSummary, OwnerRef, PodSummary,
    ReplicaSetSummary, ServiceSummary, WorkloadScale,
};
use guardian::domain::ports::llm::{ChatMessage, ChatModel, ChatResponse, ToolSpec};
use guardian::domain::ports::store::DurableStore;

/// Cluster double: serves canned state and records every mutation.
#[derive(Default)]
pub struct MockCluster {
    pub pods: Mutex<Vec<PodSummary>>,
    pub nodes: Mutex<Vec<NodeSummary>>,
    pub crashloops: Mutex<Vec<CrashLoopPod>>,
    pub replicasets: Mutex<Vec<ReplicaSetSummary>>,
    pub deployments: Mutex<Vec<DeploymentSummary>>,
    /// Pod names whose eviction fails.
    pub failing_evictions: Mutex<Vec<String>>,
    /// Mutation calls in execution order, e.g. "delete_pod default/web-1".
    pub calls: Mutex<Vec<String>>,
}

impl MockCluster {
    pub fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pod(namespace: &str, name: &str, node: &str, owner_kind: Option<&str>) -> PodSummary {
        PodSummary {
            namespace: namespace.to_string(),
            name: name.to_string(),
            phase: "Running".to_string(),
            node: Some(node.to_string()),
            restart_count: 0,
            ready: true,
            owner_refs: owner_kind
                .map(|kind| {
                    vec![OwnerRef {
                        kind: kind.to_string(),
                        name: format!("{name}-owner"),
                    }]
                })
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_crashloop_pods(&self) -> GuardianResult<Vec<CrashLoopPod>> {
        Ok(self.crashloops.lock().unwrap().clone())
    }

    async fn list_pods(&self, namespace: Option<&str>) -> GuardianResult<Vec<PodSummary>> {
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|p| namespace.is_none_or(|ns| p.namespace == ns))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> GuardianResult<PodSummary> {
        self.pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.namespace == namespace && p.name == name)
            .cloned()
            .ok_or_else(|| GuardianError::Api {
                status: 404,
                message: format!("pod {namespace}/{name} not found"),
            })
    }

    async fn pods_on_node(&self, node: &str) -> GuardianResult<Vec<PodSummary>> {
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|p| p.node.as_deref() == Some(node))
            .cloned()
            .collect())
    }

    async fn list_nodes(&self) -> GuardianResult<Vec<NodeSummary>> {
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn list_deployments(
        &self,
        _namespace: Option<&str>,
    ) -> GuardianResult<Vec<DeploymentSummary>> {
        Ok(self.deployments.lock().unwrap().clone())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> GuardianResult<DeploymentSummary> {
        self.deployments
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.namespace == namespace && d.name == name)
            .cloned()
            .ok_or_else(|| GuardianError::Api {
                status: 404,
                message: format!("deployment {namespace}/{name} not found"),
            })
    }

    async fn list_statefulsets(
        &self,
        _namespace: Option<&str>,
    ) -> GuardianResult<Vec<DeploymentSummary>> {
        Ok(Vec::new())
    }

    async fn list_daemonsets(&self) -> GuardianResult<Vec<DaemonSetSummary>> {
        Ok(Vec::new())
    }

    async fn list_failed_jobs(&self) -> GuardianResult<Vec<JobSummary>> {
        Ok(Vec::new())
    }

    async fn list_replicasets_for(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> GuardianResult<Vec<ReplicaSetSummary>> {
        Ok(self
            .replicasets
            .lock()
            .unwrap()
            .iter()
            .filter(|rs| {
                rs.namespace == namespace
                    && rs
                        .owner_refs
                        .iter()
                        .any(|r| r.kind == "Deployment" && r.name == deployment)
            })
            .cloned()
            .collect())
    }

    async fn list_ingress_routes(&self) -> GuardianResult<Vec<IngressRoute>> {
        Ok(Vec::new())
    }

    async fn list_services(
        &self,
        _namespace: Option<&str>,
    ) -> GuardianResult<Vec<ServiceSummary>> {
        Ok(Vec::new())
    }

    async fn list_hpas(&self, _namespace: Option<&str>) -> GuardianResult<serde_json::Value> {
        Ok(serde_json::json!({"items": []}))
    }

    async fn list_pdbs(&self, _namespace: Option<&str>) -> GuardianResult<serde_json::Value> {
        Ok(serde_json::json!({"items": []}))
    }

    async fn list_certificates(&self) -> GuardianResult<Vec<CertificateSummary>> {
        Ok(Vec::new())
    }

    async fn recent_events(&self, _namespace: Option<&str>) -> GuardianResult<Vec<EventRecord>> {
        Ok(Vec::new())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        _container: Option<&str>,
        _tail_lines: u32,
        previous: bool,
    ) -> GuardianResult<String> {
        Ok(format!(
            "logs for {namespace}/{name} (previous={previous})"
        ))
    }

    async fn event_stream(
        &self,
    ) -> GuardianResult<BoxStream<'static, GuardianResult<EventRecord>>> {
        Ok(futures::stream::pending().boxed())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        self.record(format!("delete_pod {namespace}/{name}"));
        Ok(())
    }

    async fn rollout_restart_deployment(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        self.record(format!("rollout_restart_deployment {namespace}/{name}"));
        Ok(())
    }

    async fn rollout_restart_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> GuardianResult<()> {
        self.record(format!("rollout_restart_statefulset {namespace}/{name}"));
        Ok(())
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> GuardianResult<WorkloadScale> {
        self.record(format!("scale_deployment {namespace}/{name} -> {replicas}"));
        Ok(WorkloadScale {
            namespace: namespace.to_string(),
            name: name.to_string(),
            previous_replicas: 3,
            replicas,
        })
    }

    async fn patch_deployment_template(
        &self,
        namespace: &str,
        name: &str,
        _template: serde_json::Value,
    ) -> GuardianResult<()> {
        self.record(format!("patch_deployment_template {namespace}/{name}"));
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        self.record(format!("delete_job {namespace}/{name}"));
        Ok(())
    }

    async fn set_node_unschedulable(&self, name: &str, unschedulable: bool) -> GuardianResult<()> {
        self.record(format!("set_node_unschedulable {name} {unschedulable}"));
        Ok(())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        if self
            .failing_evictions
            .lock()
            .unwrap()
            .iter()
            .any(|n| n == name)
        {
            return Err(GuardianError::Api {
                status: 429,
                message: "disruption budget violated".to_string(),
            });
        }
        self.record(format!("evict_pod {namespace}/{name}"));
        Ok(())
    }
}

/// Fully functional in-memory durable store.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemStoreInner>,
}

#[derive(Default)]
struct MemStoreInner {
    rate: Vec<(f64, String)>,
    audit: Vec<ActionRecord>,
    approvals: HashMap<String, PendingApproval>,
    patterns: HashMap<String, u64>,
    escalations: HashMap<String, ()>,
    config: HashMap<String, String>,
    last_scan: Option<serde_json::Value>,
}

#[async_trait]
impl DurableStore for MemStore {
    fn available(&self) -> bool {
        true
    }

    async fn record_action(&self, member: &str, unix_secs: f64) -> GuardianResult<()> {
        self.inner
            .lock()
            .unwrap()
            .rate
            .push((unix_secs, member.to_string()));
        Ok(())
    }

    async fn actions_in_window(&self, window_seconds: u64) -> GuardianResult<u64> {
        let cutoff = Utc::now().timestamp() as f64 - window_seconds as f64;
        let mut inner = self.inner.lock().unwrap();
        inner.rate.retain(|(ts, _)| *ts >= cutoff);
        Ok(inner.rate.len() as u64)
    }

    async fn append_audit(&self, entry: &ActionRecord) -> GuardianResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.audit.insert(0, entry.clone());
        inner.audit.truncate(500);
        Ok(())
    }

    async fn recent_audit(&self, count: usize) -> GuardianResult<Vec<ActionRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .audit
            .iter()
            .take(count)
            .cloned()
            .collect())
    }

    async fn store_approval(&self, approval: &PendingApproval) -> GuardianResult<()> {
        self.inner
            .lock()
            .unwrap()
            .approvals
            .insert(approval.id.clone(), approval.clone());
        Ok(())
    }

    async fn update_approval(&self, id: &str, status: ApprovalStatus) -> GuardianResult<()> {
        if let Some(approval) = self.inner.lock().unwrap().approvals.get_mut(id) {
            approval.status = status;
        }
        Ok(())
    }

    async fn list_approvals(&self) -> GuardianResult<Vec<PendingApproval>> {
        Ok(self.inner.lock().unwrap().approvals.values().cloned().collect())
    }

    async fn increment_pattern(&self, key: &str) -> GuardianResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.patterns.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn pattern_count(&self, key: &str) -> GuardianResult<u64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .patterns
            .get(key)
            .copied()
            .unwrap_or(0))
    }

    async fn pattern_counts(&self) -> GuardianResult<HashMap<String, u64>> {
        Ok(self.inner.lock().unwrap().patterns.clone())
    }

    async fn record_escalation(&self, key: &str, _cooldown_seconds: u64) -> GuardianResult<()> {
        self.inner
            .lock()
            .unwrap()
            .escalations
            .insert(key.to_string(), ());
        Ok(())
    }

    async fn recently_escalated(&self, key: &str) -> GuardianResult<bool> {
        Ok(self.inner.lock().unwrap().escalations.contains_key(key))
    }

    async fn set_config_override(&self, key: &str, raw: &str) -> GuardianResult<()> {
        self.inner
            .lock()
            .unwrap()
            .config
            .insert(key.to_string(), raw.to_string());
        Ok(())
    }

    async fn get_config_override(&self, key: &str) -> GuardianResult<Option<String>> {
        Ok(self.inner.lock().unwrap().config.get(key).cloned())
    }

    async fn all_config_overrides(&self) -> GuardianResult<HashMap<String, String>> {
        Ok(self.inner.lock().unwrap().config.clone())
    }

    async fn delete_config_override(&self, key: &str) -> GuardianResult<()> {
        self.inner.lock().unwrap().config.remove(key);
        Ok(())
    }

    async fn store_last_scan(&self, result: &serde_json::Value) -> GuardianResult<()> {
        self.inner.lock().unwrap().last_scan = Some(result.clone());
        Ok(())
    }

    async fn last_scan(&self) -> GuardianResult<Option<serde_json::Value>> {
        Ok(self.inner.lock().unwrap().last_scan.clone())
    }
}

/// Chat model that replays a fixed sequence of responses.
pub struct ScriptedModel {
    responses: Mutex<Vec<ChatResponse>>,
    cursor: AtomicUsize,
    /// Message batches seen, for asserting on prompts.
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            cursor: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> GuardianResult<ChatResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .get(index)
            .or_else(|| responses.last())
            .cloned()
            .unwrap_or_else(|| ScriptedModel::text("No further findings.")))
    }
}
