//! Action gateway policy pipeline: namespace protection, approvals, rate
//! limiting, drain composition, and rollback.

mod common;

use std::sync::Arc;

use guardian::domain::models::action::ActionResult;
use guardian::domain::models::config::Config;
use guardian::domain::ports::cluster::{OwnerRef, ReplicaSetSummary};
use guardian::infrastructure::config::ConfigStore;
use guardian::services::gateway::ActionGateway;

use common::{MemStore, MockCluster};

fn build_gateway(config: Config) -> (Arc<ActionGateway>, Arc<MockCluster>, Arc<MemStore>) {
    let cluster = Arc::new(MockCluster::default());
    let store = Arc::new(MemStore::default());
    let config_store = Arc::new(ConfigStore::new(Arc::new(config), store.clone()));
    let gateway = Arc::new(ActionGateway::new(
        cluster.clone(),
        store.clone(),
        config_store,
    ));
    (gateway, cluster, store)
}

fn open_config() -> Config {
    Config {
        require_approval_for: Vec::new(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_protected_namespace_blocks_without_api_call() {
    let (gateway, cluster, _store) = build_gateway(Config::default());

    let outcome = gateway
        .restart_pod("kube-system", "coredns-abc", "test")
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("protected"));
    assert!(cluster.calls().is_empty(), "no API call may be made");

    // The denial itself is audited as blocked.
    let audit = gateway.recent_audit(10).await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].result, ActionResult::Blocked);
    assert_eq!(audit[0].namespace, "kube-system");
}

#[tokio::test]
async fn test_scale_to_zero_requires_approval_regardless_of_budget() {
    let (gateway, cluster, _store) = build_gateway(open_config());

    let outcome = gateway.scale_deployment("default", "web", 0, "test").await;

    assert!(!outcome.success);
    assert!(outcome.requires_approval);
    assert!(outcome.approval_id.is_some());
    assert!(cluster.calls().is_empty());

    let approvals = gateway.list_approvals().await;
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].action, "scale_deployment");

    // Scaling to a positive count is not approval-gated.
    let outcome = gateway.scale_deployment("default", "web", 2, "test").await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(cluster.calls(), vec!["scale_deployment default/web -> 2"]);
}

#[tokio::test]
async fn test_rate_limit_exhaustion() {
    let config = Config {
        require_approval_for: Vec::new(),
        max_actions_per_hour: 2,
        ..Default::default()
    };
    let (gateway, cluster, _store) = build_gateway(config);

    assert!(gateway.restart_pod("default", "a", "t").await.success);
    assert!(gateway.restart_pod("default", "b", "t").await.success);

    let outcome = gateway.restart_pod("default", "c", "t").await;
    assert!(!outcome.success);
    let error = outcome.error.unwrap().to_lowercase();
    assert!(error.contains("rate limit"), "got: {error}");
    assert_eq!(cluster.calls().len(), 2, "third call never reaches the API");
}

#[tokio::test]
async fn test_blocked_actions_do_not_consume_budget() {
    let config = Config {
        require_approval_for: Vec::new(),
        max_actions_per_hour: 2,
        ..Default::default()
    };
    let (gateway, _cluster, _store) = build_gateway(config);

    // Policy denials must not count against the window.
    for _ in 0..5 {
        let outcome = gateway.restart_pod("kube-system", "coredns", "t").await;
        assert!(!outcome.success);
    }
    assert!(gateway.restart_pod("default", "a", "t").await.success);
    assert!(gateway.restart_pod("default", "b", "t").await.success);
}

#[tokio::test]
async fn test_approval_decision_lifecycle() {
    let (gateway, _cluster, _store) = build_gateway(Config::default());

    let outcome = gateway.drain_node("node-1", "maintenance").await;
    assert!(outcome.requires_approval);
    let approval_id = outcome.approval_id.unwrap();

    let decided = gateway.resolve_approval(&approval_id, true).await.unwrap();
    assert_eq!(
        decided.status,
        guardian::domain::models::action::ApprovalStatus::Approved
    );

    // Already decided: a second decision is rejected.
    assert!(gateway.resolve_approval(&approval_id, false).await.is_none());
    assert!(gateway.resolve_approval("nonsense", true).await.is_none());
}

#[tokio::test]
async fn test_drain_node_pod_selection() {
    let (gateway, cluster, _store) = build_gateway(open_config());
    {
        let mut pods = cluster.pods.lock().unwrap();
        pods.push(MockCluster::pod("kube-system", "coredns", "node-1", None));
        pods.push(MockCluster::pod(
            "default",
            "ds-node-exporter",
            "node-1",
            Some("DaemonSet"),
        ));
        pods.push(MockCluster::pod(
            "default",
            "web",
            "node-1",
            Some("ReplicaSet"),
        ));
        pods.push(MockCluster::pod("default", "elsewhere", "node-2", None));
    }

    let outcome = gateway.drain_node("node-1", "maintenance").await;
    assert!(outcome.success, "{:?}", outcome.error);

    let evicted: Vec<String> = outcome.details["evicted"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(evicted, vec!["default/web"]);

    let skipped: Vec<String> = outcome.details["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped
        .iter()
        .any(|s| s.contains("kube-system/coredns") && s.contains("protected namespace")));
    assert!(skipped
        .iter()
        .any(|s| s.contains("ds-node-exporter") && s.contains("DaemonSet")));

    let calls = cluster.calls();
    assert_eq!(calls[0], "set_node_unschedulable node-1 true");
    assert!(calls.contains(&"evict_pod default/web".to_string()));
    assert!(!calls.iter().any(|c| c.contains("coredns")));
}

#[tokio::test]
async fn test_drain_reports_failed_evictions_as_skips() {
    let (gateway, cluster, _store) = build_gateway(open_config());
    {
        let mut pods = cluster.pods.lock().unwrap();
        pods.push(MockCluster::pod("default", "web", "node-1", None));
        pods.push(MockCluster::pod("default", "stuck", "node-1", None));
    }
    cluster
        .failing_evictions
        .lock()
        .unwrap()
        .push("stuck".to_string());

    let outcome = gateway.drain_node("node-1", "maintenance").await;
    assert!(outcome.success);
    let skipped = outcome.details["skipped"].as_array().unwrap();
    assert!(skipped
        .iter()
        .any(|s| s.as_str().unwrap().contains("eviction failed")));
}

#[tokio::test]
async fn test_rollback_patches_second_highest_revision() {
    let (gateway, cluster, _store) = build_gateway(open_config());
    {
        let mut sets = cluster.replicasets.lock().unwrap();
        for (name, revision) in [("web-v3", 3i64), ("web-v2", 2), ("web-v1", 1)] {
            sets.push(ReplicaSetSummary {
                namespace: "default".to_string(),
                name: name.to_string(),
                owner_refs: vec![OwnerRef {
                    kind: "Deployment".to_string(),
                    name: "web".to_string(),
                }],
                revision,
                template: serde_json::json!({"metadata": {"labels": {"rev": revision}}}),
            });
        }
    }

    let outcome = gateway.rollback_deployment("default", "web", "bad deploy").await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.details["rolled_back_to_revision"], 2);
    assert_eq!(
        cluster.calls(),
        vec!["patch_deployment_template default/web"]
    );
}

#[tokio::test]
async fn test_rollback_with_single_revision_fails() {
    let (gateway, cluster, _store) = build_gateway(open_config());
    cluster.replicasets.lock().unwrap().push(ReplicaSetSummary {
        namespace: "default".to_string(),
        name: "web-v1".to_string(),
        owner_refs: vec![OwnerRef {
            kind: "Deployment".to_string(),
            name: "web".to_string(),
        }],
        revision: 1,
        template: serde_json::json!({}),
    });

    let outcome = gateway.rollback_deployment("default", "web", "test").await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("No previous revision"));
    assert!(cluster.calls().is_empty());

    // The failed attempt is audited and consumes budget.
    let audit = gateway.recent_audit(5).await;
    assert_eq!(audit[0].result, ActionResult::Failed);
}

#[tokio::test]
async fn test_audit_records_reference_unprotected_namespaces_only() {
    let (gateway, _cluster, _store) = build_gateway(open_config());

    gateway.restart_pod("default", "a", "t").await;
    gateway.restart_pod("media", "b", "t").await;

    let config = Config::default();
    for record in gateway.recent_audit(50).await {
        if record.result.counts_against_budget() {
            assert!(!config.is_namespace_protected(&record.namespace));
        }
    }
}
