//! Inbound alert payloads: Alertmanager v4 webhooks and Falco-shaped
//! runtime-security events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::signal::Severity;

/// A single alert inside an Alertmanager webhook payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default, rename = "startsAt")]
    pub starts_at: Option<String>,
}

impl Alert {
    /// Alert name from labels; empty string when absent.
    pub fn name(&self) -> &str {
        self.labels.get("alertname").map_or("", String::as_str)
    }

    pub fn namespace(&self) -> &str {
        self.labels.get("namespace").map_or("", String::as_str)
    }

    pub fn description(&self) -> &str {
        self.annotations
            .get("description")
            .or_else(|| self.annotations.get("summary"))
            .map_or("", String::as_str)
    }

    /// Convenience constructor used by tests and the webhook layer.
    pub fn from_labels(labels: &[(&str, &str)]) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Default::default()
        }
    }
}

/// Alertmanager v4 webhook payload, accepted verbatim.
///
/// Only `status == "firing"` payloads trigger correlation.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertmanagerPayload {
    #[serde(default)]
    pub version: Option<String>,
    pub status: String,
    #[serde(default, rename = "groupLabels")]
    pub group_labels: HashMap<String, String>,
    #[serde(default, rename = "commonLabels")]
    pub common_labels: HashMap<String, String>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl AlertmanagerPayload {
    pub fn is_firing(&self) -> bool {
        self.status == "firing"
    }
}

/// Falco-shaped runtime-security event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FalcoEvent {
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub output_fields: HashMap<String, serde_json::Value>,
}

impl FalcoEvent {
    /// Map Falco priorities onto guardian severities.
    pub fn severity(&self) -> Severity {
        match self
            .priority
            .as_deref()
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "emergency" | "alert" | "critical" => Severity::Critical,
            "error" | "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn namespace(&self) -> String {
        self.output_fields
            .get("k8s.ns.name")
            .and_then(|v| v.as_str())
            .unwrap_or("cluster")
            .to_string()
    }
}
