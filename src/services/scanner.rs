//! Full cluster scan: the on-demand and periodic health sweep behind
//! `/api/v1/scan` and the background scan task.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::errors::GuardianResult;
use crate::domain::ports::cluster::ClusterApi;
use crate::domain::ports::pipeline::ClusterAnalyzer;
use crate::domain::ports::store::DurableStore;
use crate::domain::ports::telemetry::{MetricsBackend, StatusPage};
use crate::services::broadcast::{BroadcastHub, BroadcastKind};

pub struct ClusterScanner {
    cluster: Arc<dyn ClusterApi>,
    metrics: Option<Arc<dyn MetricsBackend>>,
    status_page: Option<Arc<dyn StatusPage>>,
    analyzer: Option<Arc<dyn ClusterAnalyzer>>,
    store: Arc<dyn DurableStore>,
    broadcast: Arc<BroadcastHub>,
    last_scan: RwLock<Option<serde_json::Value>>,
}

impl ClusterScanner {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        metrics: Option<Arc<dyn MetricsBackend>>,
        status_page: Option<Arc<dyn StatusPage>>,
        analyzer: Option<Arc<dyn ClusterAnalyzer>>,
        store: Arc<dyn DurableStore>,
        broadcast: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            cluster,
            metrics,
            status_page,
            analyzer,
            store,
            broadcast,
            last_scan: RwLock::new(None),
        }
    }

    /// Run one full scan and return its summary. The result is persisted
    /// and broadcast as `scan_complete`.
    pub async fn scan(&self) -> GuardianResult<serde_json::Value> {
        let started = Utc::now();
        let mut issues: Vec<serde_json::Value> = Vec::new();

        match self.cluster.list_crashloop_pods().await {
            Ok(pods) => {
                for p in pods {
                    issues.push(json!({
                        "source": "k8s_crashloop",
                        "severity": "critical",
                        "namespace": p.namespace,
                        "resource": p.name,
                        "summary": format!("container {} restarted {} times", p.container, p.restart_count),
                    }));
                }
            }
            Err(err) => warn!(error = %err, "scan: crashloop check failed"),
        }

        match self.cluster.list_failed_jobs().await {
            Ok(jobs) => {
                for j in jobs {
                    issues.push(json!({
                        "source": "failed_job",
                        "severity": "warning",
                        "namespace": j.namespace,
                        "resource": j.name,
                        "summary": format!("{} failed pods ({})", j.failed, j.reason),
                    }));
                }
            }
            Err(err) => warn!(error = %err, "scan: failed-job check failed"),
        }

        match self.cluster.list_nodes().await {
            Ok(nodes) => {
                for node in nodes {
                    if node.not_ready() {
                        issues.push(json!({
                            "source": "node_condition",
                            "severity": "critical",
                            "namespace": "cluster",
                            "resource": node.name,
                            "summary": "node not ready",
                        }));
                    }
                    for pressure in node.pressures() {
                        issues.push(json!({
                            "source": "node_condition",
                            "severity": "warning",
                            "namespace": "cluster",
                            "resource": node.name,
                            "summary": format!("{} asserted", pressure.kind),
                        }));
                    }
                }
            }
            Err(err) => warn!(error = %err, "scan: node check failed"),
        }

        let mut metrics_available = false;
        if let Some(metrics) = &self.metrics {
            match metrics.firing_alerts().await {
                Ok(alerts) => {
                    metrics_available = true;
                    for a in alerts {
                        issues.push(json!({
                            "source": "prometheus",
                            "severity": a.severity.clone().unwrap_or_else(|| "warning".into()),
                            "namespace": a.labels.get("namespace").cloned().unwrap_or_else(|| "cluster".into()),
                            "resource": a.name,
                            "summary": a.summary,
                        }));
                    }
                }
                Err(err) => warn!(error = %err, "scan: alert check failed"),
            }
        }

        let mut status_page_available = false;
        if let Some(status_page) = &self.status_page {
            match status_page.endpoint_statuses().await {
                Ok(statuses) => {
                    status_page_available = true;
                    for s in statuses.into_iter().filter(|s| !s.healthy) {
                        issues.push(json!({
                            "source": "gatus",
                            "severity": "warning",
                            "namespace": s.group,
                            "resource": s.name,
                            "summary": format!("status page endpoint unhealthy (uptime_7d={:.2}%)", s.uptime_7d),
                        }));
                    }
                }
                Err(err) => warn!(error = %err, "scan: status page check failed"),
            }
        }

        let mut analyzer_available = false;
        if let Some(analyzer) = &self.analyzer {
            if analyzer.available().await {
                match analyzer.issues().await {
                    Ok(found) => {
                        analyzer_available = true;
                        for issue in found {
                            issues.push(json!({
                                "source": "analyzer",
                                "severity": "warning",
                                "namespace": "cluster",
                                "resource": format!("{}/{}", issue.kind, issue.name),
                                "summary": issue.error,
                            }));
                        }
                    }
                    Err(err) => warn!(error = %err, "scan: analyzer failed"),
                }
            }
        }

        let result = json!({
            "timestamp": started.to_rfc3339(),
            "duration_seconds": (Utc::now() - started).num_milliseconds() as f64 / 1000.0,
            "healthy": issues.is_empty(),
            "issue_count": issues.len(),
            "issues": issues,
            "sources": {
                "metrics_available": metrics_available,
                "status_page_available": status_page_available,
                "analyzer_available": analyzer_available,
            },
        });

        *self.last_scan.write().await = Some(result.clone());
        if let Err(err) = self.store.store_last_scan(&result).await {
            warn!(error = %err, "scan result not persisted");
        }
        self.broadcast
            .publish(BroadcastKind::ScanComplete, None, result.clone());

        Ok(result)
    }

    /// The most recent scan result: durable store first, then the
    /// in-process copy.
    pub async fn last_scan(&self) -> Option<serde_json::Value> {
        if self.store.available() {
            if let Ok(Some(result)) = self.store.last_scan().await {
                return Some(result);
            }
        }
        self.last_scan.read().await.clone()
    }
}
