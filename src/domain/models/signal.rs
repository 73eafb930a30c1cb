//! Anomaly signals produced by the continuous monitor's detectors.

use serde::{Deserialize, Serialize};

/// Severity of a signal or alert.
///
/// Ordered so that `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The detector that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Warning/Error events from the orchestrator event stream.
    K8sEvents,
    /// Crash-looping pods detected by the fast loop.
    K8sCrashloop,
    /// Firing alerts from the metrics backend.
    Prometheus,
    /// Ingress reachability probe failures.
    Ingress,
    /// Degraded daemon sets.
    Daemonset,
    /// Persistent volume claims above the usage threshold.
    PvcUsage,
    /// Unhealthy endpoints on the external status page.
    Gatus,
    /// Per-namespace log error spikes.
    LogSpike,
    /// Node conditions (Ready, MemoryPressure, DiskPressure, PIDPressure).
    NodeCondition,
    /// Deployment rollouts that stopped progressing.
    Rollout,
    /// Alerts delivered over the webhook surface.
    Webhook,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::K8sEvents => "k8s_events",
            Self::K8sCrashloop => "k8s_crashloop",
            Self::Prometheus => "prometheus",
            Self::Ingress => "ingress",
            Self::Daemonset => "daemonset",
            Self::PvcUsage => "pvc_usage",
            Self::Gatus => "gatus",
            Self::LogSpike => "log_spike",
            Self::NodeCondition => "node_condition",
            Self::Rollout => "rollout",
            Self::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected anomaly from a lightweight check.
///
/// Cheap to produce and suppressible: the dispatcher drops any signal whose
/// `dedupe_key` was seen within the suppression window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub source: SignalSource,
    pub severity: Severity,
    pub title: String,
    pub details: String,
    pub namespace: String,
    pub resource: String,
    pub dedupe_key: String,
}

impl AnomalySignal {
    /// Key the dispatcher batches on.
    pub fn group_key(&self) -> String {
        format!("{}/{}", self.namespace, self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_severity_round_trip() {
        for sev in [Severity::Info, Severity::Warning, Severity::Critical] {
            assert_eq!(Severity::parse_str(sev.as_str()), Some(sev));
        }
        assert_eq!(Severity::parse_str("bogus"), None);
    }

    #[test]
    fn test_source_serde_names() {
        let json = serde_json::to_string(&SignalSource::K8sCrashloop).unwrap();
        assert_eq!(json, "\"k8s_crashloop\"");
        let json = serde_json::to_string(&SignalSource::NodeCondition).unwrap();
        assert_eq!(json, "\"node_condition\"");
    }

    #[test]
    fn test_group_key() {
        let sig = AnomalySignal {
            source: SignalSource::K8sCrashloop,
            severity: Severity::Critical,
            title: "CrashLoopBackOff: default/pod-x".into(),
            details: "Container main has 7 restarts".into(),
            namespace: "default".into(),
            resource: "pod-x".into(),
            dedupe_key: "crashloop:default/pod-x/main".into(),
        };
        assert_eq!(sig.group_key(), "default/pod-x");
    }
}
