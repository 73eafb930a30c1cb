//! Action gateway: the single path for mutations against the orchestrator.
//!
//! Every mutation runs the same policy pipeline, evaluated in order with
//! the first failure short-circuiting and being recorded:
//! 1. namespace protection
//! 2. approval requirement
//! 3. rolling rate limit (limit re-read from the config store per call)
//! 4. execution against the orchestrator
//! 5. audit record (durable store + bounded in-memory ring)

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::domain::errors::GuardianResult;
use crate::domain::models::action::{
    ActionOutcome, ActionRecord, ActionResult, ApprovalStatus, PendingApproval,
};
use crate::domain::ports::cluster::ClusterApi;
use crate::domain::ports::store::DurableStore;
use crate::infrastructure::config::ConfigStore;

const AUDIT_RING_CAPACITY: usize = 500;
const RATE_WINDOW_SECONDS: u64 = 3600;

pub struct ActionGateway {
    cluster: Arc<dyn ClusterApi>,
    store: Arc<dyn DurableStore>,
    config: Arc<ConfigStore>,
    /// Bounded mirror of recent action records; the durable store is
    /// authoritative when available.
    ring: RwLock<VecDeque<ActionRecord>>,
    /// In-process rate window, used when the durable store is down.
    window: Mutex<VecDeque<(chrono::DateTime<Utc>, String)>>,
    approvals: RwLock<HashMap<String, PendingApproval>>,
}

impl ActionGateway {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        store: Arc<dyn DurableStore>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            cluster,
            store,
            config,
            ring: RwLock::new(VecDeque::new()),
            window: Mutex::new(VecDeque::new()),
            approvals: RwLock::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Policy pipeline
    // ------------------------------------------------------------------

    /// Evaluate pre-mutation policy. `Err` carries the short-circuit
    /// outcome, already recorded in the audit log.
    async fn guard(
        &self,
        action: &str,
        target: &str,
        namespace: &str,
        reason: &str,
        scale_to_zero: bool,
    ) -> Result<(), ActionOutcome> {
        // 1. Namespace protection
        let protected = self.config.get_string_list("protected_namespaces").await;
        if protected.iter().any(|n| n == namespace) {
            let outcome = ActionOutcome::failed(format!("Namespace {namespace} is protected"));
            self.record(
                ActionRecord::new(action, target, namespace, reason, ActionResult::Blocked)
                    .with_details(json!({"policy": "protected_namespace"})),
            )
            .await;
            return Err(outcome);
        }

        // 2. Approval requirement. Scaling to zero is approval-gated even
        // when not listed.
        let approval_set = self.config.get_string_list("require_approval_for").await;
        if approval_set.iter().any(|a| a == action) || scale_to_zero {
            let approval = PendingApproval::new(action, target, namespace, reason);
            let approval_id = approval.id.clone();
            if let Err(err) = self.store.store_approval(&approval).await {
                warn!(error = %err, "pending approval not persisted");
            }
            self.approvals
                .write()
                .await
                .insert(approval_id.clone(), approval);
            self.record(
                ActionRecord::new(action, target, namespace, reason, ActionResult::Blocked)
                    .with_details(
                        json!({"policy": "approval_required", "approval_id": approval_id.clone()}),
                    ),
            )
            .await;
            return Err(ActionOutcome::approval_required(
                format!("{action} requires human approval"),
                approval_id,
            ));
        }

        // 3. Rate limit
        let max_actions = self.config.get_u64("max_actions_per_hour").await.max(1);
        let in_window = self.actions_in_window().await;
        if in_window >= max_actions {
            let outcome = ActionOutcome::failed(format!(
                "Rate limit exceeded: {in_window} of {max_actions} actions in the last hour"
            ));
            self.record(
                ActionRecord::new(action, target, namespace, reason, ActionResult::Blocked)
                    .with_details(json!({"policy": "rate_limit", "in_window": in_window})),
            )
            .await;
            return Err(outcome);
        }

        Ok(())
    }

    /// Count of budget-consuming actions in the rolling window.
    async fn actions_in_window(&self) -> u64 {
        if self.store.available() {
            match self.store.actions_in_window(RATE_WINDOW_SECONDS).await {
                Ok(count) => return count,
                Err(err) => warn!(error = %err, "durable rate window read failed"),
            }
        }
        let mut window = self.window.lock().await;
        let cutoff = Utc::now() - ChronoDuration::seconds(RATE_WINDOW_SECONDS as i64);
        while window.front().is_some_and(|(ts, _)| *ts < cutoff) {
            window.pop_front();
        }
        window.len() as u64
    }

    /// Append an audit record to the ring and the durable log; successful
    /// and failed executions also consume rate budget.
    async fn record(&self, record: ActionRecord) {
        if record.result.counts_against_budget() {
            let member = record.rate_member();
            let score = record.timestamp.timestamp() as f64;
            if let Err(err) = self.store.record_action(&member, score).await {
                warn!(error = %err, "rate window entry not persisted");
            }
            let mut window = self.window.lock().await;
            window.push_back((record.timestamp, record.action.clone()));
        }

        if let Err(err) = self.store.append_audit(&record).await {
            warn!(error = %err, "audit entry not persisted");
        }

        info!(
            action = %record.action,
            target = %record.target,
            namespace = %record.namespace,
            result = record.result.as_str(),
            "audit log"
        );

        let mut ring = self.ring.write().await;
        while ring.len() >= AUDIT_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// Translate an execution result into an audit record + outcome.
    async fn finish(
        &self,
        action: &str,
        target: &str,
        namespace: &str,
        reason: &str,
        result: GuardianResult<String>,
        details: serde_json::Value,
    ) -> ActionOutcome {
        match result {
            Ok(message) => {
                self.record(
                    ActionRecord::new(action, target, namespace, reason, ActionResult::Success)
                        .with_details(details.clone()),
                )
                .await;
                ActionOutcome::ok(message).with_details(details)
            }
            Err(err) => {
                let error = err.to_string();
                self.record(
                    ActionRecord::new(action, target, namespace, reason, ActionResult::Failed)
                        .with_details(json!({"error": error})),
                )
                .await;
                ActionOutcome::failed(error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub async fn restart_pod(&self, namespace: &str, name: &str, reason: &str) -> ActionOutcome {
        if let Err(outcome) = self
            .guard("restart_pod", name, namespace, reason, false)
            .await
        {
            return outcome;
        }
        let result = self
            .cluster
            .delete_pod(namespace, name)
            .await
            .map(|()| format!("Pod {namespace}/{name} deleted; controller will recreate it"));
        self.finish("restart_pod", name, namespace, reason, result, json!(null))
            .await
    }

    pub async fn rollout_restart_deployment(
        &self,
        namespace: &str,
        name: &str,
        reason: &str,
    ) -> ActionOutcome {
        if let Err(outcome) = self
            .guard("rollout_restart_deployment", name, namespace, reason, false)
            .await
        {
            return outcome;
        }
        let result = self
            .cluster
            .rollout_restart_deployment(namespace, name)
            .await
            .map(|()| format!("Rollout restart of deployment {namespace}/{name} triggered"));
        self.finish(
            "rollout_restart_deployment",
            name,
            namespace,
            reason,
            result,
            json!(null),
        )
        .await
    }

    pub async fn rollout_restart_statefulset(
        &self,
        namespace: &str,
        name: &str,
        reason: &str,
    ) -> ActionOutcome {
        if let Err(outcome) = self
            .guard("rollout_restart_statefulset", name, namespace, reason, false)
            .await
        {
            return outcome;
        }
        let result = self
            .cluster
            .rollout_restart_statefulset(namespace, name)
            .await
            .map(|()| format!("Rollout restart of statefulset {namespace}/{name} triggered"));
        self.finish(
            "rollout_restart_statefulset",
            name,
            namespace,
            reason,
            result,
            json!(null),
        )
        .await
    }

    pub async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        reason: &str,
    ) -> ActionOutcome {
        if let Err(outcome) = self
            .guard("scale_deployment", name, namespace, reason, replicas == 0)
            .await
        {
            return outcome;
        }
        let result = self
            .cluster
            .scale_deployment(namespace, name, replicas)
            .await
            .map(|scale| {
                format!(
                    "Deployment {namespace}/{name} scaled from {} to {replicas}",
                    scale.previous_replicas
                )
            });
        self.finish(
            "scale_deployment",
            name,
            namespace,
            reason,
            result,
            json!({"replicas": replicas}),
        )
        .await
    }

    /// Roll a deployment back to its previous replica-set revision.
    pub async fn rollback_deployment(
        &self,
        namespace: &str,
        name: &str,
        reason: &str,
    ) -> ActionOutcome {
        if let Err(outcome) = self
            .guard("rollback_deployment", name, namespace, reason, false)
            .await
        {
            return outcome;
        }

        let rollback = async {
            let mut owned: Vec<_> = self
                .cluster
                .list_replicasets_for(namespace, name)
                .await?
                .into_iter()
                .filter(|rs| {
                    rs.owner_refs
                        .iter()
                        .any(|r| r.kind == "Deployment" && r.name == name)
                })
                .collect();

            if owned.len() < 2 {
                return Err(crate::domain::errors::GuardianError::Other(
                    "No previous revision found to rollback to".to_string(),
                ));
            }

            // Highest revision is current; the second entry is the target.
            owned.sort_by(|a, b| b.revision.cmp(&a.revision));
            let previous = &owned[1];
            self.cluster
                .patch_deployment_template(namespace, name, previous.template.clone())
                .await?;
            Ok(previous.revision)
        }
        .await;

        match rollback {
            Ok(revision) => {
                self.finish(
                    "rollback_deployment",
                    name,
                    namespace,
                    reason,
                    Ok(format!(
                        "Deployment {name} rolled back to revision {revision}"
                    )),
                    json!({"rolled_back_to_revision": revision}),
                )
                .await
            }
            Err(err) => {
                self.finish(
                    "rollback_deployment",
                    name,
                    namespace,
                    reason,
                    Err(err),
                    json!(null),
                )
                .await
            }
        }
    }

    pub async fn delete_failed_job(
        &self,
        namespace: &str,
        name: &str,
        reason: &str,
    ) -> ActionOutcome {
        if let Err(outcome) = self
            .guard("delete_failed_job", name, namespace, reason, false)
            .await
        {
            return outcome;
        }
        let result = self
            .cluster
            .delete_job(namespace, name)
            .await
            .map(|()| format!("Job {namespace}/{name} deleted"));
        self.finish("delete_failed_job", name, namespace, reason, result, json!(null))
            .await
    }

    pub async fn cordon_node(&self, name: &str, reason: &str) -> ActionOutcome {
        if let Err(outcome) = self.guard("cordon_node", name, "cluster", reason, false).await {
            return outcome;
        }
        let result = self
            .cluster
            .set_node_unschedulable(name, true)
            .await
            .map(|()| format!("Node {name} cordoned"));
        self.finish("cordon_node", name, "cluster", reason, result, json!(null))
            .await
    }

    /// Drain a node: cordon it, then evict every pod that is neither in a
    /// protected namespace nor owned by a daemon set. Per-pod eviction
    /// failures are reported as skips, not an overall failure.
    pub async fn drain_node(&self, name: &str, reason: &str) -> ActionOutcome {
        if let Err(outcome) = self.guard("drain_node", name, "cluster", reason, false).await {
            return outcome;
        }

        if let Err(err) = self.cluster.set_node_unschedulable(name, true).await {
            return self
                .finish("drain_node", name, "cluster", reason, Err(err), json!(null))
                .await;
        }

        let pods = match self.cluster.pods_on_node(name).await {
            Ok(pods) => pods,
            Err(err) => {
                return self
                    .finish("drain_node", name, "cluster", reason, Err(err), json!(null))
                    .await;
            }
        };

        let protected = self.config.get_string_list("protected_namespaces").await;
        let mut evicted = Vec::new();
        let mut skipped = Vec::new();
        for pod in pods {
            let id = format!("{}/{}", pod.namespace, pod.name);
            if protected.iter().any(|n| n == &pod.namespace) {
                skipped.push(format!("{id} (protected namespace)"));
                continue;
            }
            if pod.is_daemonset_owned() {
                skipped.push(format!("{id} (DaemonSet)"));
                continue;
            }
            match self.cluster.evict_pod(&pod.namespace, &pod.name).await {
                Ok(()) => evicted.push(id),
                Err(err) => skipped.push(format!("{id} (eviction failed: {err})")),
            }
        }

        info!(node = name, evicted = evicted.len(), skipped = skipped.len(), "drained node");
        self.finish(
            "drain_node",
            name,
            "cluster",
            reason,
            Ok(format!("Node {name} drained")),
            json!({"evicted": evicted, "skipped": skipped}),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Audit and approvals
    // ------------------------------------------------------------------

    /// Recent audit entries, durable store first with the ring as fallback.
    pub async fn recent_audit(&self, count: usize) -> Vec<ActionRecord> {
        if self.store.available() {
            if let Ok(entries) = self.store.recent_audit(count).await {
                if !entries.is_empty() {
                    return entries;
                }
            }
        }
        let ring = self.ring.read().await;
        ring.iter().rev().take(count).cloned().collect()
    }

    pub async fn rate_limit_status(&self) -> serde_json::Value {
        let max_actions = self.config.get_u64("max_actions_per_hour").await;
        let in_window = self.actions_in_window().await;
        json!({
            "remaining_actions": max_actions.saturating_sub(in_window),
            "max_actions_per_hour": max_actions,
        })
    }

    pub async fn list_approvals(&self) -> Vec<PendingApproval> {
        if self.store.available() {
            if let Ok(approvals) = self.store.list_approvals().await {
                if !approvals.is_empty() {
                    return approvals;
                }
            }
        }
        self.approvals.read().await.values().cloned().collect()
    }

    /// Decide a pending approval. Returns the updated entry, or None for an
    /// unknown id or an already-decided approval.
    pub async fn resolve_approval(&self, id: &str, approve: bool) -> Option<PendingApproval> {
        let status = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };

        let mut approvals = self.approvals.write().await;
        let entry = approvals.get_mut(id)?;
        if entry.status != ApprovalStatus::Pending {
            return None;
        }
        entry.status = status;
        let updated = entry.clone();
        drop(approvals);

        if let Err(err) = self.store.update_approval(id, status).await {
            warn!(error = %err, "approval decision not persisted");
        }
        info!(approval_id = id, status = status.as_str(), "approval decided");
        Some(updated)
    }
}
