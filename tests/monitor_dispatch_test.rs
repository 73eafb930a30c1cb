//! Monitor dispatcher: dedupe, batching, and broadcast behavior.

mod common;

use std::sync::Arc;
use std::time::Duration;

use guardian::domain::models::config::Config;
use guardian::domain::models::signal::{AnomalySignal, Severity, SignalSource};
use guardian::infrastructure::config::ConfigStore;
use guardian::services::broadcast::{BroadcastHub, BroadcastKind};
use guardian::services::checks::CheckContext;
use guardian::services::classifier::EscalationClassifier;
use guardian::services::monitor::ContinuousMonitor;

use common::{MemStore, MockCluster};

fn crashloop_signal(pod: &str) -> AnomalySignal {
    AnomalySignal {
        source: SignalSource::K8sCrashloop,
        severity: Severity::Critical,
        title: format!("CrashLoopBackOff: default/{pod}"),
        details: "Container main has 7 restarts".to_string(),
        namespace: "default".to_string(),
        resource: pod.to_string(),
        dedupe_key: format!("crashloop:default/{pod}/main"),
    }
}

fn build_monitor() -> (Arc<ContinuousMonitor>, Arc<BroadcastHub>) {
    let config = Config {
        // Tight windows keep the test fast; dedupe semantics are identical.
        anomaly_batch_window: 1,
        anomaly_suppression_window: 300,
        event_watch_enabled: false,
        fast_loop_interval_seconds: 600,
        ..Default::default()
    };
    let cluster = Arc::new(MockCluster::default());
    let store = Arc::new(MemStore::default());
    let config_store = Arc::new(ConfigStore::new(Arc::new(config.clone()), store));
    let broadcast = Arc::new(BroadcastHub::new(64));
    let checks = CheckContext {
        cluster: cluster.clone(),
        metrics: None,
        logs: None,
        status_page: None,
        http: reqwest::Client::new(),
        pvc_threshold_percent: config.pvc_usage_threshold_percent,
        log_error_threshold: config.log_error_spike_threshold,
    };
    let monitor = Arc::new(ContinuousMonitor::new(
        cluster,
        checks,
        Arc::new(EscalationClassifier::new(config.escalation_threshold)),
        None,
        config_store,
        broadcast.clone(),
    ));
    (monitor, broadcast)
}

/// Two identical crash-loop signals inside the suppression window produce
/// exactly one anomaly broadcast naming the pod.
#[tokio::test]
async fn test_crashloop_dedupe_single_broadcast() {
    let (monitor, broadcast) = build_monitor();
    let mut events = broadcast.subscribe();
    Arc::clone(&monitor).start().await;

    monitor.enqueue(crashloop_signal("pod-x")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.enqueue(crashloop_signal("pod-x")).await;

    // Wait for the batch window to flush.
    let message = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("a broadcast should arrive")
        .unwrap();
    assert_eq!(message.kind, BroadcastKind::AnomalyDetected);
    assert_eq!(message.data["group"], "default/pod-x");
    assert_eq!(message.data["signals"].as_array().unwrap().len(), 1);

    // No second anomaly broadcast follows for the suppressed duplicate.
    let second = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
    assert!(second.is_err(), "duplicate signal must be suppressed");

    let status = monitor.status().await;
    assert_eq!(status.total_anomalies, 2);
    assert_eq!(status.suppressed_anomalies, 1);
    assert_eq!(status.tracked_dedupe_keys, 1);

    monitor.stop().await;
}

/// Distinct resources land in distinct groups within one flush.
#[tokio::test]
async fn test_batch_groups_by_namespace_resource() {
    let (monitor, broadcast) = build_monitor();
    let mut events = broadcast.subscribe();
    Arc::clone(&monitor).start().await;

    monitor.enqueue(crashloop_signal("pod-a")).await;
    monitor.enqueue(crashloop_signal("pod-b")).await;

    let mut groups = Vec::new();
    for _ in 0..2 {
        let message = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("broadcast expected")
            .unwrap();
        groups.push(message.data["group"].as_str().unwrap().to_string());
    }
    groups.sort();
    assert_eq!(groups, vec!["default/pod-a", "default/pod-b"]);

    monitor.stop().await;
}

/// Recent anomalies expose the tracked keys with suppression state.
#[tokio::test]
async fn test_recent_anomalies_reflect_tracked_keys() {
    let (monitor, broadcast) = build_monitor();
    let mut events = broadcast.subscribe();
    Arc::clone(&monitor).start().await;

    monitor.enqueue(crashloop_signal("pod-x")).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), events.recv()).await;

    let recent = monitor.recent_anomalies().await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].dedupe_key, "crashloop:default/pod-x/main");
    assert!(recent[0].suppressed, "fresh keys sit inside the window");
    assert!(recent[0].age_seconds >= 0.0);

    monitor.stop().await;
}
