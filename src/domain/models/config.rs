//! Guardian configuration.
//!
//! A flat settings struct so every field can be addressed by name through the
//! runtime config store. Defaults here are the programmatic baseline; the
//! loader merges a YAML file and `GUARDIAN_`-prefixed environment variables
//! on top, and the config store layers durable runtime overrides above that.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // HTTP surface
    pub host: String,
    pub port: u16,
    pub debug: bool,

    // LLM backend
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub llm_provider: String,

    // Optional cluster-analysis helper
    pub k8sgpt_url: String,
    pub k8sgpt_enabled: bool,

    // Orchestrator API
    pub kube_api_url: String,
    pub kube_token: Option<String>,
    pub kube_token_path: String,
    /// CA bundle for the API server; falls back to the in-cluster bundle
    /// when unset.
    pub kube_ca_path: Option<String>,
    /// Explicit opt-out of TLS verification, for lab clusters only.
    pub kube_insecure_skip_tls_verify: bool,

    // Gateway policy
    pub protected_namespaces: Vec<String>,
    pub max_actions_per_hour: u64,
    pub require_approval_for: Vec<String>,

    // Monitor cadence
    pub scan_interval_seconds: u64,
    pub fast_loop_interval_seconds: u64,
    pub event_watch_enabled: bool,
    pub anomaly_suppression_window: u64,
    pub anomaly_batch_window: u64,
    pub pvc_usage_threshold_percent: f64,
    pub log_error_spike_threshold: u64,

    // Correlator
    pub correlation_window_seconds: u64,
    pub correlation_debounce_seconds: u64,
    pub correlation_expiry_seconds: u64,

    // Self-tuner
    pub escalation_threshold: u64,
    pub auto_escalate_recurring: bool,
    pub dev_controller_url: String,
    pub dev_controller_enabled: bool,

    // Quiet hours (HH:MM, IANA tz)
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub quiet_hours_tz: String,

    // Quorum gate
    pub quorum_enabled: bool,
    pub quorum_agents: usize,
    pub quorum_threshold: f64,

    // Agent
    pub max_agent_iterations: usize,

    // Logging
    pub log_level: String,
    pub log_format: String,

    // Durable store / vector memory
    pub redis_url: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub embedding_model: String,

    // Telemetry backends
    pub prometheus_url: String,
    pub loki_url: String,
    pub gatus_url: String,
    pub crowdsec_lapi_url: String,
    pub crowdsec_api_key: Option<String>,

    // Notification endpoints
    pub slack_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub teams_webhook_url: Option<String>,
    pub pagerduty_integration_key: Option<String>,
    pub custom_webhook_url: Option<String>,
    pub notification_rate_limit: u64,

    // Forge (PR creation)
    pub github_token: Option<String>,
    pub github_owner: String,
    pub github_repo: String,
    pub github_base_branch: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8900,
            debug: false,

            llm_base_url: "http://litellm.llm.svc.cluster.local:4000/v1".to_string(),
            llm_model: "llama3.2".to_string(),
            llm_api_key: String::new(),
            llm_provider: "openai".to_string(),

            k8sgpt_url: "http://k8sgpt.k8sgpt.svc.cluster.local:8080".to_string(),
            k8sgpt_enabled: true,

            kube_api_url: "https://kubernetes.default.svc".to_string(),
            kube_token: None,
            kube_token_path: "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
            kube_ca_path: None,
            kube_insecure_skip_tls_verify: false,

            protected_namespaces: vec![
                "kube-system".to_string(),
                "kube-public".to_string(),
                "kube-node-lease".to_string(),
                "longhorn-system".to_string(),
                "calico-system".to_string(),
                "tigera-operator".to_string(),
            ],
            max_actions_per_hour: 30,
            require_approval_for: vec![
                "delete_pvc".to_string(),
                "cordon_node".to_string(),
                "drain_node".to_string(),
                "scale_to_zero".to_string(),
            ],

            scan_interval_seconds: 300,
            fast_loop_interval_seconds: 30,
            event_watch_enabled: true,
            anomaly_suppression_window: 300,
            anomaly_batch_window: 10,
            pvc_usage_threshold_percent: 85.0,
            log_error_spike_threshold: 50,

            correlation_window_seconds: 300,
            correlation_debounce_seconds: 30,
            correlation_expiry_seconds: 3600,

            escalation_threshold: 3,
            auto_escalate_recurring: true,
            dev_controller_url: "http://dev-controller.dev.svc.cluster.local:8800".to_string(),
            dev_controller_enabled: false,

            quiet_hours_start: None,
            quiet_hours_end: None,
            quiet_hours_tz: "UTC".to_string(),

            quorum_enabled: false,
            quorum_agents: 3,
            quorum_threshold: 0.5,

            max_agent_iterations: 25,

            log_level: "info".to_string(),
            log_format: "json".to_string(),

            redis_url: "redis://redis-ai-master.llm.svc.cluster.local:6379".to_string(),
            qdrant_url: "http://qdrant.llm.svc.cluster.local:6333".to_string(),
            qdrant_collection: "guardian_issues".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),

            prometheus_url:
                "http://prometheus-kube-prometheus-prometheus.prometheus.svc.cluster.local:9090"
                    .to_string(),
            loki_url: "http://loki.prometheus.svc.cluster.local:3100".to_string(),
            gatus_url: "http://gatus.status.svc.cluster.local:80".to_string(),
            crowdsec_lapi_url: "http://crowdsec-lapi.crowdsec.svc.cluster.local:8080".to_string(),
            crowdsec_api_key: None,

            slack_webhook_url: None,
            discord_webhook_url: None,
            teams_webhook_url: None,
            pagerduty_integration_key: None,
            custom_webhook_url: None,
            notification_rate_limit: 60,

            github_token: None,
            github_owner: "anomalous-ventures".to_string(),
            github_repo: "infrastructure".to_string(),
            github_base_branch: "main".to_string(),
        }
    }
}

impl Config {
    pub fn is_namespace_protected(&self, namespace: &str) -> bool {
        self.protected_namespaces.iter().any(|n| n == namespace)
    }
}

/// Value kinds the runtime config store can validate and round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Bool,
    Int,
    Float,
    Str,
    StrList,
}

/// Schema of runtime-overridable keys: name and kind.
///
/// Only keys listed here are accepted by the config store; everything else
/// is a startup-time setting.
pub const RUNTIME_KEYS: &[(&str, ConfigKind)] = &[
    ("debug", ConfigKind::Bool),
    ("llm_model", ConfigKind::Str),
    ("k8sgpt_enabled", ConfigKind::Bool),
    ("protected_namespaces", ConfigKind::StrList),
    ("max_actions_per_hour", ConfigKind::Int),
    ("require_approval_for", ConfigKind::StrList),
    ("scan_interval_seconds", ConfigKind::Int),
    ("fast_loop_interval_seconds", ConfigKind::Int),
    ("event_watch_enabled", ConfigKind::Bool),
    ("anomaly_suppression_window", ConfigKind::Int),
    ("anomaly_batch_window", ConfigKind::Int),
    ("pvc_usage_threshold_percent", ConfigKind::Float),
    ("log_error_spike_threshold", ConfigKind::Int),
    ("correlation_window_seconds", ConfigKind::Int),
    ("correlation_debounce_seconds", ConfigKind::Int),
    ("correlation_expiry_seconds", ConfigKind::Int),
    ("escalation_threshold", ConfigKind::Int),
    ("auto_escalate_recurring", ConfigKind::Bool),
    ("dev_controller_enabled", ConfigKind::Bool),
    ("quiet_hours_start", ConfigKind::Str),
    ("quiet_hours_end", ConfigKind::Str),
    ("quiet_hours_tz", ConfigKind::Str),
    ("quorum_enabled", ConfigKind::Bool),
    ("quorum_agents", ConfigKind::Int),
    ("quorum_threshold", ConfigKind::Float),
    ("max_agent_iterations", ConfigKind::Int),
    ("notification_rate_limit", ConfigKind::Int),
];

/// Look up the kind of a runtime-overridable key.
pub fn runtime_kind(key: &str) -> Option<ConfigKind> {
    RUNTIME_KEYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8900);
        assert_eq!(config.fast_loop_interval_seconds, 30);
        assert_eq!(config.anomaly_suppression_window, 300);
        assert_eq!(config.max_actions_per_hour, 30);
        assert_eq!(config.max_agent_iterations, 25);
        assert!(config.is_namespace_protected("kube-system"));
        assert!(!config.is_namespace_protected("default"));
        assert!(!config.kube_insecure_skip_tls_verify);
    }

    #[test]
    fn test_runtime_schema() {
        assert_eq!(
            runtime_kind("fast_loop_interval_seconds"),
            Some(ConfigKind::Int)
        );
        assert_eq!(runtime_kind("protected_namespaces"), Some(ConfigKind::StrList));
        assert_eq!(runtime_kind("quorum_threshold"), Some(ConfigKind::Float));
        assert_eq!(runtime_kind("llm_api_key"), None);
        assert_eq!(runtime_kind("nonsense"), None);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
port: 9100
fast_loop_interval_seconds: 15
protected_namespaces:
  - kube-system
quorum_enabled: true
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.port, 9100);
        assert_eq!(config.fast_loop_interval_seconds, 15);
        assert_eq!(config.protected_namespaces, vec!["kube-system"]);
        assert!(config.quorum_enabled);
        // Unspecified fields keep their defaults
        assert_eq!(config.max_actions_per_hour, 30);
    }
}
