//! Fast-loop detectors.
//!
//! Each check is independent, cheap, and LLM-free; failures are logged and
//! skipped so one broken backend never takes the loop down. Optional
//! backends (metrics, logs, status page) simply yield no signals when
//! absent.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::errors::GuardianResult;
use crate::domain::models::signal::{AnomalySignal, Severity, SignalSource};
use crate::domain::ports::cluster::ClusterApi;
use crate::domain::ports::telemetry::{LogBackend, MetricsBackend, StatusPage};

/// Bodies shorter than this on a 200 are treated as suspicious: a healthy
/// application page is never a handful of bytes.
const SUSPICIOUS_BODY_BYTES: usize = 64;

const ERROR_PAGE_MARKERS: &[&str] = &[
    "404 page not found",
    "503 service temporarily unavailable",
    "502 bad gateway",
    "default backend",
];

/// Everything the detectors need, snapshotted per tick.
#[derive(Clone)]
pub struct CheckContext {
    pub cluster: Arc<dyn ClusterApi>,
    pub metrics: Option<Arc<dyn MetricsBackend>>,
    pub logs: Option<Arc<dyn LogBackend>>,
    pub status_page: Option<Arc<dyn StatusPage>>,
    pub http: reqwest::Client,
    pub pvc_threshold_percent: f64,
    pub log_error_threshold: u64,
}

/// Run every check concurrently; a check that errors contributes nothing.
pub async fn run_all(ctx: &CheckContext) -> Vec<AnomalySignal> {
    let (
        crashloops,
        alerts,
        ingress,
        daemonsets,
        pvcs,
        endpoints,
        log_spikes,
        nodes,
        rollouts,
    ) = tokio::join!(
        crashloop_pods(ctx),
        prometheus_alerts(ctx),
        ingress_health(ctx),
        daemonset_health(ctx),
        pvc_usage(ctx),
        status_page_health(ctx),
        log_error_spikes(ctx),
        node_conditions(ctx),
        rollout_progress(ctx),
    );

    let mut signals = Vec::new();
    for (name, result) in [
        ("crashloop", crashloops),
        ("prometheus", alerts),
        ("ingress", ingress),
        ("daemonset", daemonsets),
        ("pvc", pvcs),
        ("status_page", endpoints),
        ("log_spike", log_spikes),
        ("node_condition", nodes),
        ("rollout", rollouts),
    ] {
        match result {
            Ok(mut found) => signals.append(&mut found),
            Err(err) => warn!(check = name, error = %err, "fast loop check failed"),
        }
    }
    signals
}

pub async fn crashloop_pods(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let pods = ctx.cluster.list_crashloop_pods().await?;
    Ok(pods
        .into_iter()
        .map(|p| AnomalySignal {
            source: SignalSource::K8sCrashloop,
            severity: Severity::Critical,
            title: format!("CrashLoopBackOff: {}/{}", p.namespace, p.name),
            details: format!("Container {} has {} restarts", p.container, p.restart_count),
            namespace: p.namespace.clone(),
            resource: p.name.clone(),
            dedupe_key: format!("crashloop:{}/{}/{}", p.namespace, p.name, p.container),
        })
        .collect())
}

pub async fn prometheus_alerts(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let Some(metrics) = &ctx.metrics else {
        return Ok(Vec::new());
    };
    let alerts = metrics.firing_alerts().await?;
    Ok(alerts
        .into_iter()
        .map(|a| {
            let namespace = a
                .labels
                .get("namespace")
                .cloned()
                .unwrap_or_else(|| "cluster".to_string());
            let resource = a.labels.get("pod").cloned().unwrap_or_else(|| a.name.clone());
            AnomalySignal {
                source: SignalSource::Prometheus,
                severity: a
                    .severity
                    .as_deref()
                    .and_then(Severity::parse_str)
                    .unwrap_or(Severity::Warning),
                title: format!("Alert firing: {}", a.name),
                details: a.summary.clone(),
                dedupe_key: format!("prom_alert:{}:{namespace}", a.name),
                namespace,
                resource,
            }
        })
        .collect())
}

/// Probe every ingress host over HTTPS, flagging unreachable routes,
/// error statuses, known error pages, and suspiciously small bodies.
pub async fn ingress_health(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let routes = ctx.cluster.list_ingress_routes().await?;
    let mut signals = Vec::new();

    for route in routes {
        let Some(host) = route.hosts.first() else {
            continue;
        };
        let url = format!("https://{host}/");
        let failure = match probe_url(&ctx.http, &url).await {
            ProbeResult::Healthy => None,
            ProbeResult::Unreachable(err) => Some((Severity::Critical, err)),
            ProbeResult::ErrorStatus(status) => {
                Some((Severity::Warning, format!("HTTP {status}")))
            }
            ProbeResult::ErrorPage(marker) => {
                Some((Severity::Warning, format!("error page detected: {marker}")))
            }
            ProbeResult::SuspiciousBody(len) => Some((
                Severity::Warning,
                format!("suspiciously small body ({len} bytes)"),
            )),
        };

        if let Some((severity, details)) = failure {
            signals.push(AnomalySignal {
                source: SignalSource::Ingress,
                severity,
                title: format!("Ingress unhealthy: {}/{}", route.namespace, route.name),
                details,
                namespace: route.namespace.clone(),
                resource: route.name.clone(),
                dedupe_key: format!("ingress:{}/{}", route.namespace, route.name),
            });
        }
    }
    Ok(signals)
}

enum ProbeResult {
    Healthy,
    Unreachable(String),
    ErrorStatus(u16),
    ErrorPage(String),
    SuspiciousBody(usize),
}

async fn probe_url(http: &reqwest::Client, url: &str) -> ProbeResult {
    let response = match http
        .get(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return ProbeResult::Unreachable(err.to_string()),
    };

    let status = response.status();
    if status.as_u16() >= 400 {
        return ProbeResult::ErrorStatus(status.as_u16());
    }

    let body = response.text().await.unwrap_or_default();
    let lowered = body.to_lowercase();
    for marker in ERROR_PAGE_MARKERS {
        if lowered.contains(marker) {
            return ProbeResult::ErrorPage((*marker).to_string());
        }
    }
    if body.len() < SUSPICIOUS_BODY_BYTES {
        return ProbeResult::SuspiciousBody(body.len());
    }
    ProbeResult::Healthy
}

pub async fn daemonset_health(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let daemonsets = ctx.cluster.list_daemonsets().await?;
    Ok(daemonsets
        .into_iter()
        .filter(|ds| ds.unavailable > 0)
        .map(|ds| AnomalySignal {
            source: SignalSource::Daemonset,
            severity: Severity::Warning,
            title: format!("DaemonSet degraded: {}/{}", ds.namespace, ds.name),
            details: format!(
                "desired={} ready={} unavailable={}",
                ds.desired, ds.ready, ds.unavailable
            ),
            namespace: ds.namespace.clone(),
            resource: ds.name.clone(),
            dedupe_key: format!("daemonset:{}/{}", ds.namespace, ds.name),
        })
        .collect())
}

pub async fn pvc_usage(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let Some(metrics) = &ctx.metrics else {
        return Ok(Vec::new());
    };
    let volumes = metrics.volume_usage().await?;
    Ok(volumes
        .into_iter()
        .filter(|v| v.usage_percent >= ctx.pvc_threshold_percent)
        .map(|v| AnomalySignal {
            source: SignalSource::PvcUsage,
            severity: if v.usage_percent < 95.0 {
                Severity::Warning
            } else {
                Severity::Critical
            },
            title: format!("PVC high usage: {}/{}", v.namespace, v.claim),
            details: format!("{:.1}% used", v.usage_percent),
            namespace: v.namespace.clone(),
            resource: v.claim.clone(),
            dedupe_key: format!("pvc:{}/{}", v.namespace, v.claim),
        })
        .collect())
}

pub async fn status_page_health(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let Some(status_page) = &ctx.status_page else {
        return Ok(Vec::new());
    };
    let statuses = status_page.endpoint_statuses().await?;
    Ok(statuses
        .into_iter()
        .filter(|s| !s.healthy)
        .map(|s| AnomalySignal {
            source: SignalSource::Gatus,
            severity: Severity::Warning,
            title: format!("Status page unhealthy: {}/{}", s.group, s.name),
            details: format!("uptime_7d={:.2}%", s.uptime_7d),
            namespace: if s.group.is_empty() {
                "unknown".to_string()
            } else {
                s.group.clone()
            },
            resource: s.name.clone(),
            dedupe_key: format!("gatus:{}/{}", s.group, s.name),
        })
        .collect())
}

pub async fn log_error_spikes(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let Some(logs) = &ctx.logs else {
        return Ok(Vec::new());
    };
    let volumes = logs.error_volume("15m").await?;
    Ok(volumes
        .into_iter()
        .filter(|v| v.count > ctx.log_error_threshold)
        .map(|v| AnomalySignal {
            source: SignalSource::LogSpike,
            severity: Severity::Warning,
            title: format!("Log error spike in {}", v.namespace),
            details: format!(
                "{} error lines in 15m (threshold {})",
                v.count, ctx.log_error_threshold
            ),
            namespace: v.namespace.clone(),
            resource: "logs".to_string(),
            dedupe_key: format!("log_spike:{}", v.namespace),
        })
        .collect())
}

pub async fn node_conditions(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let nodes = ctx.cluster.list_nodes().await?;
    let mut signals = Vec::new();
    for node in nodes {
        if node.not_ready() {
            signals.push(AnomalySignal {
                source: SignalSource::NodeCondition,
                severity: Severity::Critical,
                title: format!("Node not ready: {}", node.name),
                details: node
                    .conditions
                    .iter()
                    .find(|c| c.kind == "Ready")
                    .map(|c| format!("{}: {}", c.reason, c.message))
                    .unwrap_or_default(),
                namespace: "cluster".to_string(),
                resource: node.name.clone(),
                dedupe_key: format!("node:{}:NotReady", node.name),
            });
        }
        for pressure in node.pressures() {
            signals.push(AnomalySignal {
                source: SignalSource::NodeCondition,
                severity: Severity::Warning,
                title: format!("Node condition {}: {}", pressure.kind, node.name),
                details: format!("{}: {}", pressure.reason, pressure.message),
                namespace: "cluster".to_string(),
                resource: node.name.clone(),
                dedupe_key: format!("node:{}:{}", node.name, pressure.kind),
            });
        }
    }
    Ok(signals)
}

pub async fn rollout_progress(ctx: &CheckContext) -> GuardianResult<Vec<AnomalySignal>> {
    let deployments = ctx.cluster.list_deployments(None).await?;
    Ok(deployments
        .into_iter()
        .filter(|d| d.available < d.desired && d.progressing == Some(false))
        .map(|d| {
            debug!(namespace = %d.namespace, name = %d.name, "rollout stuck");
            AnomalySignal {
                source: SignalSource::Rollout,
                severity: Severity::Warning,
                title: format!("Rollout stuck: {}/{}", d.namespace, d.name),
                details: format!(
                    "available={} desired={} reason={}",
                    d.available, d.desired, d.condition_reason
                ),
                namespace: d.namespace.clone(),
                resource: d.name.clone(),
                dedupe_key: format!("rollout:{}/{}", d.namespace, d.name),
            }
        })
        .collect())
}
