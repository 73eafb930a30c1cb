//! REST handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let monitor = state.monitor.status().await;
    Json(json!({
        "status": "ok",
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
        "monitor_running": monitor.running,
        "durable_store_available": state.store.available(),
        "vector_memory_available": state.memory.available(),
    }))
}

pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let monitor = state.monitor.status().await;
    if monitor.running {
        (StatusCode::OK, Json(json!({"ready": true})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false})),
        )
    }
}

pub async fn live() -> Json<Value> {
    Json(json!({"alive": true}))
}

/// Metric exposition in the Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> String {
    let monitor = state.monitor.status().await;
    let investigations = state.agent.list().await;
    let mut out = String::new();
    out.push_str("# TYPE guardian_anomalies_total counter\n");
    out.push_str(&format!(
        "guardian_anomalies_total {}\n",
        monitor.total_anomalies
    ));
    out.push_str("# TYPE guardian_anomalies_suppressed_total counter\n");
    out.push_str(&format!(
        "guardian_anomalies_suppressed_total {}\n",
        monitor.suppressed_anomalies
    ));
    out.push_str("# TYPE guardian_anomaly_queue_depth gauge\n");
    out.push_str(&format!(
        "guardian_anomaly_queue_depth {}\n",
        monitor.anomaly_queue_depth
    ));
    out.push_str("# TYPE guardian_investigations_total counter\n");
    out.push_str(&format!(
        "guardian_investigations_total {}\n",
        investigations.len()
    ));
    out.push_str("# TYPE guardian_websocket_clients gauge\n");
    out.push_str(&format!(
        "guardian_websocket_clients {}\n",
        state.broadcast.subscriber_count()
    ));
    out
}

pub async fn run_scan(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.scanner.scan().await {
        Ok(summary) => {
            let audit = state.gateway.recent_audit(20).await;
            let rate_limit = state.gateway.rate_limit_status().await;
            (
                StatusCode::OK,
                Json(json!({
                    "scan": summary,
                    "recent_audit": audit,
                    "rate_limit": rate_limit,
                })),
            )
        }
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": err.to_string()})),
        ),
    }
}

pub async fn last_scan(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.scanner.last_scan().await {
        Some(result) => (StatusCode::OK, Json(result)),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no scan recorded yet"})),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct InvestigateRequest {
    pub description: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub async fn investigate(
    State(state): State<AppState>,
    Json(request): Json<InvestigateRequest>,
) -> (StatusCode, Json<Value>) {
    if request.description.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "description must not be empty"})),
        );
    }
    let investigation = state
        .agent
        .investigate(&request.description, request.thread_id)
        .await;
    let audit = state.gateway.recent_audit(20).await;
    (
        StatusCode::OK,
        Json(json!({
            "success": investigation.status == crate::domain::models::InvestigationStatus::Completed,
            "summary": investigation.summary,
            "error": investigation.error,
            "audit_log": audit,
            "investigation_id": investigation.id,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

pub async fn audit_log(State(state): State<AppState>) -> Json<Value> {
    let audit = state.gateway.recent_audit(50).await;
    let rate_limit = state.gateway.rate_limit_status().await;
    Json(json!({"entries": audit, "rate_limit": rate_limit}))
}

pub async fn list_approvals(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"approvals": state.gateway.list_approvals().await}))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.gateway.resolve_approval(&id, true).await {
        Some(approval) => (StatusCode::OK, Json(json!({"approval": approval}))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown or already-decided approval"})),
        ),
    }
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.gateway.resolve_approval(&id, false).await {
        Some(approval) => (StatusCode::OK, Json(json!({"approval": approval}))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown or already-decided approval"})),
        ),
    }
}

pub async fn list_incidents(State(state): State<AppState>) -> Json<Value> {
    let incidents: Vec<Value> = state
        .correlator
        .get_active_incidents()
        .await
        .iter()
        .map(crate::domain::models::Incident::to_json)
        .collect();
    Json(json!({"incidents": incidents}))
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.correlator.get_incident(&id).await {
        Some(incident) => (StatusCode::OK, Json(incident.to_json())),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("incident {id} not found")})),
        ),
    }
}

pub async fn monitor_status(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.monitor.status().await).unwrap_or(Value::Null))
}

pub async fn monitor_anomalies(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"anomalies": state.monitor.recent_anomalies().await}))
}

pub async fn get_config(State(state): State<AppState>) -> Json<Value> {
    Json(Value::Object(state.config_store.all().await))
}

pub async fn patch_config(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(entries) = body.as_object() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "expected a JSON object of key/value overrides"})),
        );
    };
    let mut applied = Vec::new();
    for (key, value) in entries {
        if let Err(err) = state.config_store.set(key, value).await {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": err.to_string(), "applied": applied})),
            );
        }
        applied.push(key.clone());
    }
    (StatusCode::OK, Json(json!({"applied": applied})))
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub key: String,
}

pub async fn reset_config(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> (StatusCode, Json<Value>) {
    match state.config_store.reset(&request.key).await {
        Ok(()) => (StatusCode::OK, Json(json!({"reset": request.key}))),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": err.to_string()})),
        ),
    }
}

pub async fn suggestions(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"suggestions": state.self_tuner.suggest_improvements().await}))
}
