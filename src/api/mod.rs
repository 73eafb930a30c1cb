//! Inbound HTTP/WebSocket surface.

pub mod routes;
pub mod webhooks;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};

use crate::domain::models::config::Config;
use crate::domain::ports::memory::IssueMemory;
use crate::domain::ports::store::DurableStore;
use crate::infrastructure::config::ConfigStore;
use crate::services::agent::AgentOrchestrator;
use crate::services::broadcast::BroadcastHub;
use crate::services::correlator::IncidentCorrelator;
use crate::services::gateway::ActionGateway;
use crate::services::monitor::ContinuousMonitor;
use crate::services::scanner::ClusterScanner;
use crate::services::self_tuner::SelfTuner;

/// Shared handler state: the wired component graph.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub config_store: Arc<ConfigStore>,
    pub store: Arc<dyn DurableStore>,
    pub broadcast: Arc<BroadcastHub>,
    pub monitor: Arc<ContinuousMonitor>,
    pub correlator: Arc<IncidentCorrelator>,
    pub gateway: Arc<ActionGateway>,
    pub agent: Arc<AgentOrchestrator>,
    pub scanner: Arc<ClusterScanner>,
    pub self_tuner: Arc<SelfTuner>,
    pub memory: Arc<dyn IssueMemory>,
    pub started_at: DateTime<Utc>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/api/v1/scan", post(routes::run_scan))
        .route("/api/v1/scan/last", get(routes::last_scan))
        .route("/api/v1/investigate", post(routes::investigate))
        .route("/api/v1/audit-log", get(routes::audit_log))
        .route("/api/v1/approvals", get(routes::list_approvals))
        .route("/api/v1/approvals/:id/approve", post(routes::approve))
        .route("/api/v1/approvals/:id/reject", post(routes::reject))
        .route("/api/v1/incidents", get(routes::list_incidents))
        .route("/api/v1/incidents/:id", get(routes::get_incident))
        .route("/api/v1/monitor/status", get(routes::monitor_status))
        .route("/api/v1/monitor/anomalies", get(routes::monitor_anomalies))
        .route(
            "/api/v1/config",
            get(routes::get_config).patch(routes::patch_config),
        )
        .route("/api/v1/config/reset", post(routes::reset_config))
        .route("/api/v1/suggestions", get(routes::suggestions))
        .route("/webhook/alertmanager", post(webhooks::alertmanager))
        .route("/webhook/falco", post(webhooks::falco))
        .route("/ws", get(ws::handler))
        .with_state(state)
}
