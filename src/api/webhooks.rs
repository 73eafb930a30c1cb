//! External alert ingress: Alertmanager and Falco-shaped webhooks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::models::alert::{AlertmanagerPayload, FalcoEvent};
use crate::domain::models::signal::Severity;
use crate::services::broadcast::BroadcastKind;

use super::AppState;

/// Alertmanager v4 webhook. Only firing payloads trigger correlation;
/// resolved notifications are acknowledged and dropped.
pub async fn alertmanager(
    State(state): State<AppState>,
    Json(payload): Json<AlertmanagerPayload>,
) -> (StatusCode, Json<Value>) {
    if !payload.is_firing() {
        return (
            StatusCode::OK,
            Json(json!({"status": "ignored", "reason": "not firing"})),
        );
    }

    let mut incident_ids = Vec::new();
    for alert in payload.alerts {
        state.broadcast.publish(
            BroadcastKind::AlertReceived,
            None,
            json!({
                "alertname": alert.name(),
                "namespace": alert.namespace(),
                "description": alert.description(),
            }),
        );

        let incident = state.correlator.correlate(alert).await;
        state.correlator.schedule_investigation(&incident).await;
        if !incident_ids.contains(&incident.id) {
            incident_ids.push(incident.id);
        }
    }

    info!(incidents = incident_ids.len(), "alertmanager webhook processed");
    (
        StatusCode::OK,
        Json(json!({"status": "accepted", "incidents": incident_ids})),
    )
}

/// Runtime-security webhook (Falco shape). Severity is mapped from the
/// priority field; critical events start an immediate investigation.
pub async fn falco(
    State(state): State<AppState>,
    Json(event): Json<FalcoEvent>,
) -> (StatusCode, Json<Value>) {
    let severity = event.severity();
    let rule = event.rule.clone().unwrap_or_else(|| "unknown rule".to_string());
    let output = event.output.clone().unwrap_or_default();
    let namespace = event.namespace();

    state.broadcast.publish(
        BroadcastKind::SecurityAlert,
        None,
        json!({
            "rule": rule,
            "severity": severity.as_str(),
            "namespace": namespace,
            "output": output,
        }),
    );

    if severity == Severity::Critical {
        let agent = state.agent.clone();
        let description = format!(
            "Runtime security alert '{rule}' in namespace {namespace}: {output}"
        );
        let thread_id = format!("security-{}", uuid::Uuid::new_v4().simple());
        tokio::spawn(async move {
            agent.investigate(&description, Some(thread_id)).await;
        });
        (
            StatusCode::OK,
            Json(json!({"status": "accepted", "investigating": true})),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({"status": "accepted", "investigating": false})),
        )
    }
}
