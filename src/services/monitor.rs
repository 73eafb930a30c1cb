//! Continuous monitor: fast loop, event watcher, and anomaly dispatcher.
//!
//! Three cooperatively-scheduled tasks share one anomaly queue. Detectors
//! hold only the send handle; the dispatcher owns the receive side along
//! with the dedupe and batching state. Nothing in here ever invokes the
//! LLM: quick-fix batches are handed off through the investigate callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::escalation::EscalationLevel;
use crate::domain::models::signal::{AnomalySignal, Severity, SignalSource};
use crate::domain::ports::cluster::ClusterApi;
use crate::infrastructure::config::ConfigStore;
use crate::services::broadcast::{BroadcastHub, BroadcastKind};
use crate::services::checks::{self, CheckContext};
use crate::services::classifier::EscalationClassifier;
use crate::services::self_tuner::SelfTuner;
use crate::services::InvestigateFn;

const QUEUE_CAPACITY: usize = 1024;
const EVENT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Dedupe map: dedupe key -> last seen. Mutated only by the dispatcher.
#[derive(Debug, Default)]
pub struct Deduper {
    seen: HashMap<String, DateTime<Utc>>,
}

impl Deduper {
    /// Admit a signal unless its key was seen within the window.
    pub fn admit(&mut self, key: &str, now: DateTime<Utc>, window_seconds: u64) -> bool {
        if let Some(last) = self.seen.get(key) {
            if (now - *last).num_seconds() < window_seconds as i64 {
                return false;
            }
        }
        self.seen.insert(key.to_string(), now);
        true
    }

    /// Purge keys older than twice the suppression window.
    pub fn purge_stale(&mut self, now: DateTime<Utc>, window_seconds: u64) {
        let cutoff = now - chrono::Duration::seconds(2 * window_seconds as i64);
        self.seen.retain(|_, last| *last >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn snapshot(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut entries: Vec<_> = self
            .seen
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

/// Telemetry for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub fast_loop_interval: u64,
    pub last_fast_loop: Option<DateTime<Utc>>,
    pub last_event_watch: Option<DateTime<Utc>>,
    pub anomaly_queue_depth: u64,
    pub total_anomalies: u64,
    pub suppressed_anomalies: u64,
    pub suppression_window: u64,
    pub tracked_dedupe_keys: usize,
}

/// One tracked dedupe key with its age.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedAnomaly {
    pub dedupe_key: String,
    pub last_seen: DateTime<Utc>,
    pub age_seconds: f64,
    pub suppressed: bool,
}

struct MonitorState {
    running: AtomicBool,
    queue_depth: AtomicU64,
    total_anomalies: AtomicU64,
    suppressed_anomalies: AtomicU64,
    last_fast_loop: StdRwLock<Option<DateTime<Utc>>>,
    last_event_watch: StdRwLock<Option<DateTime<Utc>>>,
    deduper: StdMutex<Deduper>,
}

pub struct ContinuousMonitor {
    cluster: Arc<dyn ClusterApi>,
    checks: CheckContext,
    classifier: Arc<EscalationClassifier>,
    self_tuner: Option<Arc<SelfTuner>>,
    config: Arc<ConfigStore>,
    broadcast: Arc<BroadcastHub>,
    callback: Arc<StdRwLock<Option<InvestigateFn>>>,
    queue_tx: mpsc::Sender<AnomalySignal>,
    queue_rx: StdMutex<Option<mpsc::Receiver<AnomalySignal>>>,
    state: Arc<MonitorState>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ContinuousMonitor {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        checks: CheckContext,
        classifier: Arc<EscalationClassifier>,
        self_tuner: Option<Arc<SelfTuner>>,
        config: Arc<ConfigStore>,
        broadcast: Arc<BroadcastHub>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            cluster,
            checks,
            classifier,
            self_tuner,
            config,
            broadcast,
            callback: Arc::new(StdRwLock::new(None)),
            queue_tx,
            queue_rx: StdMutex::new(Some(queue_rx)),
            state: Arc::new(MonitorState {
                running: AtomicBool::new(false),
                queue_depth: AtomicU64::new(0),
                total_anomalies: AtomicU64::new(0),
                suppressed_anomalies: AtomicU64::new(0),
                last_fast_loop: StdRwLock::new(None),
                last_event_watch: StdRwLock::new(None),
                deduper: StdMutex::new(Deduper::default()),
            }),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register the investigation sink. Optional; without it quick-fix
    /// batches are only broadcast.
    pub fn set_investigate_callback(&self, callback: InvestigateFn) {
        *self.callback.write().expect("callback lock") = Some(callback);
    }

    /// Launch the fast loop, dispatcher, and (if enabled) event watcher.
    pub async fn start(self: Arc<Self>) {
        let Some(queue_rx) = self.queue_rx.lock().expect("receiver lock").take() else {
            warn!("monitor already started");
            return;
        };
        self.state.running.store(true, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(Arc::clone(&self).fast_loop()));
        tasks.push(tokio::spawn(Arc::clone(&self).dispatcher(queue_rx)));
        if self.config.get_bool("event_watch_enabled").await {
            tasks.push(tokio::spawn(Arc::clone(&self).event_watcher()));
        }
        info!(
            fast_loop_interval = self.config.get_u64("fast_loop_interval_seconds").await,
            "continuous monitor started"
        );
    }

    /// Cancel all monitoring tasks.
    pub async fn stop(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("continuous monitor stopped");
    }

    fn running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Fast loop
    // ------------------------------------------------------------------

    async fn fast_loop(self: Arc<Self>) {
        while self.running() {
            // Interval is re-read per tick so operator edits apply within
            // one iteration.
            let interval = self
                .config
                .get_u64("fast_loop_interval_seconds")
                .await
                .clamp(5, 600);
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if !self.running() {
                break;
            }
            *self.state.last_fast_loop.write().expect("status lock") = Some(Utc::now());

            let mut ctx = self.checks.clone();
            ctx.pvc_threshold_percent = self.config.get_f64("pvc_usage_threshold_percent").await;
            ctx.log_error_threshold = self.config.get_u64("log_error_spike_threshold").await;

            let signals = checks::run_all(&ctx).await;
            for signal in signals {
                self.enqueue(signal).await;
            }
        }
    }

    /// Push a signal onto the anomaly queue (also used by webhooks).
    pub async fn enqueue(&self, signal: AnomalySignal) {
        match self.queue_tx.try_send(signal) {
            Ok(()) => {
                self.state.queue_depth.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => warn!(error = %err, "anomaly queue full, signal dropped"),
        }
    }

    // ------------------------------------------------------------------
    // Event watcher
    // ------------------------------------------------------------------

    async fn event_watcher(self: Arc<Self>) {
        while self.running() {
            match self.cluster.event_stream().await {
                Ok(mut stream) => {
                    *self.state.last_event_watch.write().expect("status lock") =
                        Some(Utc::now());
                    let protected = self.config.get_string_list("protected_namespaces").await;
                    while let Some(item) = stream.next().await {
                        if !self.running() {
                            return;
                        }
                        match item {
                            Ok(event) => {
                                if event.kind != "Warning" && event.kind != "Error" {
                                    continue;
                                }
                                let namespace = if event.namespace.is_empty() {
                                    "cluster".to_string()
                                } else {
                                    event.namespace.clone()
                                };
                                if protected.iter().any(|n| n == &namespace) {
                                    continue;
                                }
                                let involved = event.involved();
                                let signal = AnomalySignal {
                                    source: SignalSource::K8sEvents,
                                    severity: if event.kind == "Warning" {
                                        Severity::Warning
                                    } else {
                                        Severity::Critical
                                    },
                                    title: format!("K8s event: {}", event.reason),
                                    details: event.message.clone(),
                                    namespace: namespace.clone(),
                                    resource: involved.clone(),
                                    dedupe_key: format!(
                                        "k8s_event:{namespace}/{involved}/{}",
                                        event.reason
                                    ),
                                };
                                self.enqueue(signal).await;
                                *self.state.last_event_watch.write().expect("status lock") =
                                    Some(Utc::now());
                            }
                            Err(err) => {
                                warn!(error = %err, "event stream item failed");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "event watcher reconnecting");
                }
            }
            if !self.running() {
                break;
            }
            tokio::time::sleep(EVENT_RECONNECT_DELAY).await;
        }
    }

    // ------------------------------------------------------------------
    // Dispatcher
    // ------------------------------------------------------------------

    async fn dispatcher(self: Arc<Self>, mut queue_rx: mpsc::Receiver<AnomalySignal>) {
        let mut batch: Vec<AnomalySignal> = Vec::new();
        let mut batch_start = Utc::now();

        loop {
            let batch_window = self.config.get_u64("anomaly_batch_window").await.max(1);
            let suppression = self.config.get_u64("anomaly_suppression_window").await;

            match tokio::time::timeout(Duration::from_secs(batch_window), queue_rx.recv()).await
            {
                Ok(Some(signal)) => {
                    self.state.queue_depth.fetch_sub(1, Ordering::SeqCst);
                    self.state.total_anomalies.fetch_add(1, Ordering::SeqCst);

                    let now = Utc::now();
                    let admitted = {
                        let mut deduper = self.state.deduper.lock().expect("dedupe lock");
                        deduper.admit(&signal.dedupe_key, now, suppression)
                    };
                    if admitted {
                        if batch.is_empty() {
                            batch_start = now;
                        }
                        batch.push(signal);
                    } else {
                        self.state.suppressed_anomalies.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Ok(None) => break,
                Err(_) => {}
            }

            let elapsed = (Utc::now() - batch_start).num_seconds();
            if !batch.is_empty() && elapsed >= batch_window as i64 {
                let flushed = std::mem::take(&mut batch);
                self.dispatch_batch(flushed).await;
            }

            {
                let mut deduper = self.state.deduper.lock().expect("dedupe lock");
                deduper.purge_stale(Utc::now(), suppression);
            }

            if !self.running() {
                break;
            }
        }
    }

    /// Group a flushed batch by (namespace, resource) and route each group
    /// by its escalation level.
    async fn dispatch_batch(&self, batch: Vec<AnomalySignal>) {
        let mut groups: HashMap<String, Vec<AnomalySignal>> = HashMap::new();
        for signal in batch {
            groups.entry(signal.group_key()).or_default().push(signal);
        }

        let external_counts = self.self_tuner.as_ref().map(|t| t.counts_snapshot());

        for (group_key, signals) in groups {
            // Record every signal's pattern with the self-tuner.
            if let Some(tuner) = &self.self_tuner {
                for signal in &signals {
                    tuner.note_occurrence(&signal.dedupe_key).await;
                }
            }

            let mut lines =
                vec![format!("Continuous monitor detected anomalies for {group_key}:")];
            let mut highest = Severity::Info;
            for signal in &signals {
                lines.push(format!(
                    "- [{}] {}: {}",
                    signal.source, signal.title, signal.details
                ));
                highest = highest.max(signal.severity);
            }
            let description = lines.join("\n");

            // Strongest escalation across the group wins.
            let escalation = signals
                .iter()
                .map(|s| self.classifier.classify(s, external_counts.as_ref()))
                .max_by_key(|e| match e.level {
                    EscalationLevel::ObservationOnly => 0,
                    EscalationLevel::QuickFix => 1,
                    EscalationLevel::LongTerm => 2,
                })
                .expect("non-empty group");

            self.broadcast.publish(
                BroadcastKind::AnomalyDetected,
                None,
                serde_json::json!({
                    "group": group_key,
                    "severity": highest.as_str(),
                    "escalation": escalation.level.as_str(),
                    "escalation_reason": escalation.reason,
                    "signals": signals.iter().map(|s| serde_json::json!({
                        "source": s.source.as_str(),
                        "severity": s.severity.as_str(),
                        "title": s.title,
                        "namespace": s.namespace,
                        "resource": s.resource,
                    })).collect::<Vec<_>>(),
                }),
            );

            match escalation.level {
                EscalationLevel::QuickFix => {
                    let thread_id = format!("cm-{}", group_key.replace('/', "-"));
                    let callback = self.callback.read().expect("callback lock").clone();
                    if let Some(callback) = callback {
                        tokio::spawn(callback(description, thread_id));
                    } else {
                        debug!(group = %group_key, "no investigate callback registered");
                    }
                }
                EscalationLevel::LongTerm => {
                    let auto = self.config.get_bool("auto_escalate_recurring").await;
                    if let (true, Some(tuner)) = (auto, &self.self_tuner) {
                        tuner.auto_escalate(&group_key, &description).await;
                    } else {
                        info!(group = %group_key, "long-term issue observed, auto-escalation off");
                    }
                }
                EscalationLevel::ObservationOnly => {
                    debug!(group = %group_key, "observation-only anomaly");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub async fn status(&self) -> MonitorStatus {
        let fast_loop_interval = self.config.get_u64("fast_loop_interval_seconds").await;
        let suppression_window = self.config.get_u64("anomaly_suppression_window").await;
        let last_fast_loop = *self.state.last_fast_loop.read().expect("status lock");
        let last_event_watch = *self.state.last_event_watch.read().expect("status lock");
        let tracked_dedupe_keys = self.state.deduper.lock().expect("dedupe lock").len();
        MonitorStatus {
            running: self.running(),
            fast_loop_interval,
            last_fast_loop,
            last_event_watch,
            anomaly_queue_depth: self.state.queue_depth.load(Ordering::SeqCst),
            total_anomalies: self.state.total_anomalies.load(Ordering::SeqCst),
            suppressed_anomalies: self.state.suppressed_anomalies.load(Ordering::SeqCst),
            suppression_window,
            tracked_dedupe_keys,
        }
    }

    /// Tracked dedupe keys with ages, newest first, capped at 100.
    pub async fn recent_anomalies(&self) -> Vec<TrackedAnomaly> {
        let suppression = self.config.get_u64("anomaly_suppression_window").await;
        let now = Utc::now();
        let deduper = self.state.deduper.lock().expect("dedupe lock");
        deduper
            .snapshot()
            .into_iter()
            .take(100)
            .map(|(dedupe_key, last_seen)| {
                let age = (now - last_seen).num_milliseconds() as f64 / 1000.0;
                TrackedAnomaly {
                    dedupe_key,
                    last_seen,
                    age_seconds: (age * 10.0).round() / 10.0,
                    suppressed: age < suppression as f64,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduper_suppresses_within_window() {
        let mut deduper = Deduper::default();
        let t0 = Utc::now();
        assert!(deduper.admit("crashloop:default/pod-x/main", t0, 300));
        // 10 seconds later, same key: suppressed.
        let t1 = t0 + chrono::Duration::seconds(10);
        assert!(!deduper.admit("crashloop:default/pod-x/main", t1, 300));
        // A different key passes.
        assert!(deduper.admit("crashloop:default/pod-y/main", t1, 300));
    }

    #[test]
    fn test_deduper_admits_after_window() {
        let mut deduper = Deduper::default();
        let t0 = Utc::now();
        assert!(deduper.admit("key", t0, 300));
        let t1 = t0 + chrono::Duration::seconds(301);
        assert!(deduper.admit("key", t1, 300));
    }

    #[test]
    fn test_purge_stale_keeps_recent() {
        let mut deduper = Deduper::default();
        let now = Utc::now();
        deduper.admit("old", now - chrono::Duration::seconds(700), 300);
        deduper.admit("fresh", now, 300);
        deduper.purge_stale(now, 300);
        assert_eq!(deduper.len(), 1);
        assert!(!deduper.admit("fresh", now, 300), "fresh key still tracked");
    }
}
