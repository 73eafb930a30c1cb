//! Incidents: groups of correlated alerts treated as one investigation unit.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::alert::Alert;

/// A group of correlated alerts.
///
/// Created on the first alert of a new correlation key, appended to while
/// alerts keep arriving within the correlation window, and sealed once its
/// debounced investigation fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub correlation_key: String,
    pub alerts: Vec<Alert>,
    pub created_at: DateTime<Utc>,
    pub last_alert_at: DateTime<Utc>,
    pub investigated: bool,
}

impl Incident {
    pub fn new(correlation_key: impl Into<String>, first_alert: Alert) -> Self {
        let key = correlation_key.into();
        let now = Utc::now();
        Self {
            id: incident_id(&format!("{key}-{}", now.timestamp_micros())),
            correlation_key: key,
            alerts: vec![first_alert],
            created_at: now,
            last_alert_at: now,
            investigated: false,
        }
    }

    pub fn add_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
        self.last_alert_at = Utc::now();
    }

    /// Distinct alert names contained in this incident.
    pub fn alert_names(&self) -> BTreeSet<String> {
        self.alerts
            .iter()
            .map(|a| a.name().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Deterministic thread id for the investigating agent.
    pub fn thread_id(&self) -> String {
        format!("incident-{}", self.id)
    }

    /// Build a combined prompt describing all correlated alerts.
    ///
    /// Duplicate (alertname, namespace, pod) triples are listed once.
    pub fn description(&self) -> String {
        let mut parts = vec![format!(
            "Correlated incident {} ({} alerts):",
            self.id,
            self.alerts.len()
        )];
        let mut seen = BTreeSet::new();
        for alert in &self.alerts {
            let name = alert.name().to_string();
            let ns = alert.namespace().to_string();
            let pod = alert
                .labels
                .get("pod")
                .cloned()
                .unwrap_or_default();
            if !seen.insert((name.clone(), ns.clone(), pod.clone())) {
                continue;
            }
            parts.push(format!(
                "  - [{name}] namespace={ns} pod={pod}: {}",
                alert.description()
            ));
        }
        parts.join("\n")
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "correlation_key": self.correlation_key,
            "alert_count": self.alerts.len(),
            "alert_names": self.alert_names(),
            "created_at": self.created_at.to_rfc3339(),
            "last_alert_at": self.last_alert_at.to_rfc3339(),
            "investigated": self.investigated,
            "description": self.description(),
        })
    }
}

/// Short deterministic incident id derived from the correlation key.
pub fn incident_id(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("inc-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_id_deterministic() {
        assert_eq!(incident_id("default/web-1"), incident_id("default/web-1"));
        assert_ne!(incident_id("default/web-1"), incident_id("default/web-2"));
        assert!(incident_id("x").starts_with("inc-"));
        assert_eq!(incident_id("x").len(), "inc-".len() + 12);
    }

    #[test]
    fn test_description_dedupes_triples() {
        let alert = Alert::from_labels(&[
            ("alertname", "KubePodCrashLooping"),
            ("namespace", "default"),
            ("pod", "web-1"),
        ]);
        let mut incident = Incident::new("default/web", alert.clone());
        incident.add_alert(alert);
        let desc = incident.description();
        assert!(desc.contains("2 alerts"));
        assert_eq!(desc.matches("KubePodCrashLooping").count(), 1);
    }

    #[test]
    fn test_last_alert_at_monotonic() {
        let mut incident = Incident::new("default/web", Alert::default());
        let created = incident.created_at;
        incident.add_alert(Alert::default());
        assert!(incident.last_alert_at >= created);
    }
}
