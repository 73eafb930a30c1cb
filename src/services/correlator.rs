//! Incident correlation engine.
//!
//! Groups related alerts (e.g. OOMKilled + CrashLoopBackOff for the same
//! workload) into a single Incident and triggers one debounced
//! investigation per group, preventing duplicate investigations and
//! conflicting remediation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::models::alert::Alert;
use crate::domain::models::incident::Incident;
use crate::services::InvestigateFn;

/// Alerts that are semantically related and should be grouped together.
const RELATED_ALERT_GROUPS: &[&[&str]] = &[
    &["KubePodCrashLooping", "KubePodNotReady", "KubeContainerWaiting"],
    &["KubeNodeNotReady", "KubeNodeUnreachable", "KubeNodePressure"],
    &[
        "KubeDeploymentReplicasMismatch",
        "KubeStatefulSetReplicasMismatch",
    ],
    &["KubePersistentVolumeFillingUp", "KubePersistentVolumeErrors"],
    &["CPUThrottlingHigh", "KubeContainerOOMKilled"],
];

fn alerts_related(a: &str, b: &str) -> bool {
    RELATED_ALERT_GROUPS
        .iter()
        .any(|group| group.contains(&a) && group.contains(&b))
}

/// Derive a correlation key from an alert.
///
/// Workload labels win, then node, then the (namespace, alertname) fallback.
pub fn correlation_key(alert: &Alert) -> String {
    let labels = &alert.labels;
    let ns = labels.get("namespace").map_or("", String::as_str);
    let workload = ["deployment", "statefulset", "daemonset", "job", "pod"]
        .iter()
        .find_map(|k| labels.get(*k))
        .filter(|v| !v.is_empty());
    if let Some(workload) = workload {
        return format!("{ns}/{workload}");
    }
    let node = labels
        .get("node")
        .or_else(|| labels.get("instance"))
        .filter(|v| !v.is_empty());
    if let Some(node) = node {
        return format!("node/{node}");
    }
    let alertname = labels
        .get("alertname")
        .map_or("unknown", String::as_str);
    format!("{ns}/{alertname}")
}

#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    pub window_seconds: u64,
    pub debounce_seconds: u64,
    pub expiry_seconds: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            window_seconds: 300,
            debounce_seconds: 30,
            expiry_seconds: 3600,
        }
    }
}

struct Inner {
    /// One incident per correlation key. Exactly one pending timer per key.
    incidents: HashMap<String, Incident>,
    timers: HashMap<String, JoinHandle<()>>,
}

pub struct IncidentCorrelator {
    config: CorrelatorConfig,
    inner: Arc<Mutex<Inner>>,
    callback: std::sync::RwLock<Option<InvestigateFn>>,
}

impl IncidentCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                incidents: HashMap::new(),
                timers: HashMap::new(),
            })),
            callback: std::sync::RwLock::new(None),
        }
    }

    /// Register the async callback invoked when a debounced incident fires.
    /// The callback receives (description, thread_id).
    pub fn set_investigation_callback(&self, callback: InvestigateFn) {
        *self.callback.write().expect("callback lock") = Some(callback);
    }

    /// Add an alert to an existing or new incident and return a snapshot.
    ///
    /// A sealed (investigated) incident never accepts new alerts: a fresh
    /// incident replaces it under the same key.
    pub async fn correlate(&self, alert: Alert) -> Incident {
        let mut inner = self.inner.lock().await;
        let key = correlation_key(&alert);
        let alertname = alert.name().to_string();
        let now = Utc::now();
        let window = self.config.window_seconds as i64;

        if let Some(incident) = inner.incidents.get_mut(&key) {
            let age = (now - incident.last_alert_at).num_seconds();
            if !incident.investigated && age < window {
                incident.add_alert(alert);
                info!(
                    incident_id = %incident.id,
                    alertname = %alertname,
                    key = %key,
                    alert_count = incident.alerts.len(),
                    "alert correlated"
                );
                return incident.clone();
            }
        }

        // Same related-alert group on a nearby incident (different name only)
        if !alertname.is_empty() {
            let related_key = inner.incidents.iter().find_map(|(k, incident)| {
                if incident.investigated
                    || (now - incident.last_alert_at).num_seconds() >= window
                {
                    return None;
                }
                incident
                    .alert_names()
                    .iter()
                    .any(|existing| existing != &alertname && alerts_related(&alertname, existing))
                    .then(|| k.clone())
            });
            if let Some(k) = related_key {
                let incident = inner.incidents.get_mut(&k).expect("key just found");
                incident.add_alert(alert);
                info!(
                    incident_id = %incident.id,
                    alertname = %alertname,
                    "alert correlated by relation"
                );
                return incident.clone();
            }
        }

        let incident = Incident::new(key.clone(), alert);
        info!(incident_id = %incident.id, key = %key, alertname = %alertname, "incident created");
        inner.incidents.insert(key, incident.clone());
        incident
    }

    /// Schedule (or reset) the debounced investigation for an incident.
    ///
    /// If another alert lands during the debounce the timer restarts, so
    /// the agent sees the full group.
    pub async fn schedule_investigation(&self, incident: &Incident) {
        let key = incident.correlation_key.clone();
        let incident_id = incident.id.clone();
        let debounce = Duration::from_secs(self.config.debounce_seconds);
        let inner = Arc::clone(&self.inner);
        let callback = self.callback.read().expect("callback lock").clone();

        let mut guard = self.inner.lock().await;
        if let Some(existing) = guard.timers.remove(&key) {
            existing.abort();
        }

        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let fired = {
                let mut inner = inner.lock().await;
                match inner.incidents.get_mut(&timer_key) {
                    // The timer belongs to this incident generation only.
                    Some(incident) if incident.id == incident_id && !incident.investigated => {
                        incident.investigated = true;
                        Some((incident.description(), incident.thread_id(), incident.alerts.len()))
                    }
                    _ => None,
                }
            };

            if let Some((description, thread_id, alert_count)) = fired {
                info!(
                    incident_id = %incident_id,
                    alert_count,
                    "incident investigation triggered"
                );
                if let Some(callback) = callback {
                    callback(description, thread_id).await;
                } else {
                    error!(incident_id = %incident_id, "no investigation callback registered");
                }
            }
        });
        guard.timers.insert(key, handle);
    }

    /// Incidents still inside the expiry window.
    pub async fn get_active_incidents(&self) -> Vec<Incident> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let expiry = self.config.expiry_seconds as i64;
        inner
            .incidents
            .values()
            .filter(|incident| (now - incident.last_alert_at).num_seconds() < expiry)
            .cloned()
            .collect()
    }

    pub async fn get_incident(&self, incident_id: &str) -> Option<Incident> {
        let inner = self.inner.lock().await;
        inner
            .incidents
            .values()
            .find(|incident| incident.id == incident_id)
            .cloned()
    }

    /// Remove incidents past the expiry window and cancel their timers.
    /// Returns the number removed.
    pub async fn expire_old(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let expiry = self.config.expiry_seconds as i64;
        let stale: Vec<String> = inner
            .incidents
            .iter()
            .filter(|(_, incident)| (now - incident.last_alert_at).num_seconds() >= expiry)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            if let Some(timer) = inner.timers.remove(key) {
                timer.abort();
            }
            inner.incidents.remove(key);
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "incidents expired");
        }
        stale.len()
    }

    /// Cancel all pending timers (lifecycle teardown).
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for (_, timer) in inner.timers.drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn alert(labels: &[(&str, &str)]) -> Alert {
        Alert::from_labels(labels)
    }

    #[test]
    fn test_correlation_key_precedence() {
        let a = alert(&[("namespace", "default"), ("deployment", "web"), ("pod", "web-1")]);
        assert_eq!(correlation_key(&a), "default/web");

        let a = alert(&[("namespace", "default"), ("pod", "web-1")]);
        assert_eq!(correlation_key(&a), "default/web-1");

        let a = alert(&[("node", "node-3"), ("alertname", "KubeNodeNotReady")]);
        assert_eq!(correlation_key(&a), "node/node-3");

        let a = alert(&[("namespace", "default"), ("alertname", "Watchdog")]);
        assert_eq!(correlation_key(&a), "default/Watchdog");
    }

    #[test]
    fn test_related_alert_groups() {
        assert!(alerts_related("KubePodCrashLooping", "KubePodNotReady"));
        assert!(alerts_related("CPUThrottlingHigh", "KubeContainerOOMKilled"));
        assert!(!alerts_related("KubePodCrashLooping", "KubeNodeNotReady"));
    }

    #[tokio::test]
    async fn test_same_key_within_window_shares_incident() {
        let correlator = IncidentCorrelator::new(CorrelatorConfig::default());
        let first = correlator
            .correlate(alert(&[
                ("alertname", "KubePodCrashLooping"),
                ("namespace", "default"),
                ("pod", "web-1"),
            ]))
            .await;
        let second = correlator
            .correlate(alert(&[
                ("alertname", "KubePodCrashLooping"),
                ("namespace", "default"),
                ("pod", "web-1"),
            ]))
            .await;
        assert_eq!(first.id, second.id);
        assert_eq!(second.alerts.len(), 2);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_share() {
        let correlator = IncidentCorrelator::new(CorrelatorConfig::default());
        let first = correlator
            .correlate(alert(&[("namespace", "default"), ("pod", "web-1")]))
            .await;
        let second = correlator
            .correlate(alert(&[("namespace", "default"), ("pod", "api-1")]))
            .await;
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_related_alertname_joins_existing_incident() {
        let correlator = IncidentCorrelator::new(CorrelatorConfig::default());
        let first = correlator
            .correlate(alert(&[
                ("alertname", "KubePodCrashLooping"),
                ("namespace", "default"),
                ("pod", "web-1"),
            ]))
            .await;
        // Different key (no workload label) but a related alert name.
        let second = correlator
            .correlate(alert(&[
                ("alertname", "KubeContainerWaiting"),
                ("namespace", "default"),
            ]))
            .await;
        assert_eq!(first.id, second.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_resets_and_fires_once() {
        let correlator = Arc::new(IncidentCorrelator::new(CorrelatorConfig {
            window_seconds: 300,
            debounce_seconds: 30,
            expiry_seconds: 3600,
        }));
        let fired: Arc<StdMutex<Vec<(String, String)>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        correlator.set_investigation_callback(Arc::new(move |description, thread_id| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push((description, thread_id));
            })
        }));

        let names = ["KubePodCrashLooping", "KubePodNotReady", "KubeContainerWaiting"];
        // t=0
        let incident = correlator
            .correlate(alert(&[
                ("alertname", names[0]),
                ("namespace", "default"),
                ("deployment", "web"),
            ]))
            .await;
        correlator.schedule_investigation(&incident).await;
        // t=5
        tokio::time::sleep(Duration::from_secs(5)).await;
        let incident = correlator
            .correlate(alert(&[
                ("alertname", names[1]),
                ("namespace", "default"),
                ("deployment", "web"),
            ]))
            .await;
        correlator.schedule_investigation(&incident).await;
        // t=12
        tokio::time::sleep(Duration::from_secs(7)).await;
        let incident = correlator
            .correlate(alert(&[
                ("alertname", names[2]),
                ("namespace", "default"),
                ("deployment", "web"),
            ]))
            .await;
        correlator.schedule_investigation(&incident).await;

        // Debounce expires 30s after the last alert (t ~= 42).
        tokio::time::sleep(Duration::from_secs(31)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1, "exactly one investigation should fire");
        let (description, thread_id) = &fired[0];
        for name in names {
            assert!(description.contains(name), "description missing {name}");
        }
        assert!(thread_id.starts_with("incident-inc-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sealed_incident_never_fires_again() {
        let correlator = Arc::new(IncidentCorrelator::new(CorrelatorConfig {
            window_seconds: 300,
            debounce_seconds: 1,
            expiry_seconds: 3600,
        }));
        let fired: Arc<StdMutex<u32>> = Arc::new(StdMutex::new(0));
        let sink = Arc::clone(&fired);
        correlator.set_investigation_callback(Arc::new(move |_description, _thread| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                *sink.lock().unwrap() += 1;
            })
        }));

        let incident = correlator
            .correlate(alert(&[("namespace", "default"), ("pod", "web-1")]))
            .await;
        correlator.schedule_investigation(&incident).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*fired.lock().unwrap(), 1);

        // A new alert on the same key now forms a NEW incident.
        let second = correlator
            .correlate(alert(&[("namespace", "default"), ("pod", "web-1")]))
            .await;
        assert_ne!(incident.id, second.id);
        assert!(!second.investigated);

        correlator.schedule_investigation(&second).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*fired.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expire_old_removes_incident_and_timer() {
        let correlator = IncidentCorrelator::new(CorrelatorConfig {
            window_seconds: 300,
            debounce_seconds: 30,
            expiry_seconds: 0,
        });
        let incident = correlator
            .correlate(alert(&[("namespace", "default"), ("pod", "web-1")]))
            .await;
        correlator.schedule_investigation(&incident).await;
        let removed = correlator.expire_old().await;
        assert_eq!(removed, 1);
        assert!(correlator.get_incident(&incident.id).await.is_none());
    }
}
