//! Self-tuning: learn from recurring signals and adapt over time.
//!
//! Tracks issue patterns, escalates stubborn ones to the long-term-fix
//! pipeline (with a per-key cool-down), and nudges the fast-loop cadence
//! up or down with cluster stability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::ports::pipeline::FixPipeline;
use crate::domain::ports::store::DurableStore;
use crate::infrastructure::config::ConfigStore;

/// 24 hours between escalations of the same pattern.
const ESCALATION_COOLDOWN_SECONDS: u64 = 86_400;

const MIN_FAST_LOOP_SECONDS: u64 = 15;
const MAX_FAST_LOOP_SECONDS: u64 = 60;
const DEFAULT_FAST_LOOP_SECONDS: u64 = 30;

/// A human-readable improvement suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub kind: String,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct CheckFeedback {
    fired: u64,
    false_positives: u64,
}

pub struct SelfTuner {
    store: Arc<dyn DurableStore>,
    pipeline: Option<Arc<dyn FixPipeline>>,
    config: Arc<ConfigStore>,
    issue_counts: Mutex<HashMap<String, u64>>,
    check_feedback: Mutex<HashMap<String, CheckFeedback>>,
}

impl SelfTuner {
    pub fn new(
        store: Arc<dyn DurableStore>,
        pipeline: Option<Arc<dyn FixPipeline>>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            store,
            pipeline,
            config,
            issue_counts: Mutex::new(HashMap::new()),
            check_feedback: Mutex::new(HashMap::new()),
        }
    }

    /// Stable key for deduplicating recurring issues.
    pub fn derive_pattern_key(namespace: &str, resource: &str, issue_type: &str) -> String {
        format!("{namespace}/{resource}/{issue_type}")
    }

    /// Increment the counter for a pattern without the escalation check.
    /// Used by the anomaly dispatcher on every dispatched signal.
    pub async fn note_occurrence(&self, pattern_key: &str) -> u64 {
        let local = {
            let mut counts = self.issue_counts.lock().expect("tuner lock");
            let entry = counts.entry(pattern_key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if self.store.available() {
            if let Err(err) = self.store.increment_pattern(pattern_key).await {
                debug!(error = %err, "pattern increment skipped");
            }
        }
        local
    }

    /// Record an issue occurrence and its resolution outcome.
    ///
    /// When the count reaches the threshold and the last resolution
    /// succeeded, the symptom recurred despite a fix: escalate for a
    /// permanent one.
    pub async fn record_issue(&self, pattern_key: &str, resolution: &str, success: bool) {
        let count = self.note_occurrence(pattern_key).await;
        let threshold = self.config.get_u64("escalation_threshold").await.max(1);

        if count >= threshold && success {
            self.auto_escalate(
                pattern_key,
                &format!(
                    "Recurring issue ({count} occurrences): resolution '{resolution}' keeps \
                     being applied. Needs permanent fix."
                ),
            )
            .await;
        }
    }

    /// Whether a pattern's combined count has crossed the threshold.
    pub async fn escalation_needed(&self, pattern_key: &str) -> bool {
        let threshold = self.config.get_u64("escalation_threshold").await.max(1);
        self.combined_count(pattern_key).await >= threshold
    }

    async fn combined_count(&self, pattern_key: &str) -> u64 {
        let local = self
            .issue_counts
            .lock()
            .expect("tuner lock")
            .get(pattern_key)
            .copied()
            .unwrap_or(0);
        let durable = if self.store.available() {
            self.store.pattern_count(pattern_key).await.unwrap_or(0)
        } else {
            0
        };
        local.max(durable)
    }

    /// Submit a recurring issue to the long-term-fix pipeline, respecting
    /// the 24 h per-key cool-down.
    pub async fn auto_escalate(&self, pattern_key: &str, summary: &str) {
        if self.store.available() {
            match self.store.recently_escalated(pattern_key).await {
                Ok(true) => {
                    debug!(pattern_key, "skipping escalation (cool-down)");
                    return;
                }
                Ok(false) => {}
                Err(err) => debug!(error = %err, "cool-down check failed, continuing"),
            }
        }

        let Some(pipeline) = &self.pipeline else {
            info!(pattern_key, "long-term pipeline not configured, skipping escalation");
            return;
        };

        let count = self.combined_count(pattern_key).await;
        let description =
            format!("Recurring issue detected ({count} occurrences): {summary}. Implement permanent fix.");
        let acceptance_criteria = vec![
            format!("Issue pattern '{pattern_key}' no longer recurs"),
            "Root cause is addressed in infrastructure or application code".to_string(),
            "Monitoring is updated if needed".to_string(),
        ];

        match pipeline.submit_goal(&description, &acceptance_criteria).await {
            Ok(result) => {
                info!(pattern_key, ?result, "auto-escalated recurring issue");
                if self.store.available() {
                    if let Err(err) = self
                        .store
                        .record_escalation(pattern_key, ESCALATION_COOLDOWN_SECONDS)
                        .await
                    {
                        debug!(error = %err, "escalation timestamp not persisted");
                    }
                }
            }
            Err(err) => {
                warn!(pattern_key, error = %err, "escalation to long-term pipeline failed");
            }
        }
    }

    /// Adjust the fast-loop interval with cluster stability, bounded to
    /// [15 s, 60 s]: stable (+10 s), active (-5 s), otherwise reset to 30 s.
    pub async fn tune_intervals(&self) {
        let total_recent: u64 = self
            .issue_counts
            .lock()
            .expect("tuner lock")
            .values()
            .sum();

        let current = self.config.get_u64("fast_loop_interval_seconds").await;
        let current = if current == 0 {
            DEFAULT_FAST_LOOP_SECONDS
        } else {
            current
        };

        let new_interval = if total_recent == 0 {
            (current + 10).min(MAX_FAST_LOOP_SECONDS)
        } else if total_recent > 5 {
            current.saturating_sub(5).max(MIN_FAST_LOOP_SECONDS)
        } else {
            DEFAULT_FAST_LOOP_SECONDS
        };

        if new_interval != current {
            match self
                .config
                .set("fast_loop_interval_seconds", &serde_json::json!(new_interval))
                .await
            {
                Ok(()) => info!(
                    old = current,
                    new = new_interval,
                    recent_issues = total_recent,
                    "tuned fast loop interval"
                ),
                Err(err) => debug!(error = %err, "interval tuning skipped"),
            }
        }
    }

    /// Feedback for the threshold-tuning suggestion: a check fired and the
    /// investigation found (or did not find) something real.
    pub fn record_check_feedback(&self, check: &str, false_positive: bool) {
        let mut feedback = self.check_feedback.lock().expect("tuner lock");
        let entry = feedback.entry(check.to_string()).or_default();
        entry.fired += 1;
        if false_positive {
            entry.false_positives += 1;
        }
    }

    /// Derive improvement suggestions from what the tuner has seen.
    pub async fn suggest_improvements(&self) -> Vec<Suggestion> {
        let threshold = self.config.get_u64("escalation_threshold").await.max(1);
        let mut suggestions = Vec::new();

        let counts = self.issue_counts.lock().expect("tuner lock").clone();

        // Recurring patterns deserve a playbook.
        for (key, count) in &counts {
            if *count >= threshold {
                suggestions.push(Suggestion {
                    kind: "new_playbook".to_string(),
                    subject: key.clone(),
                    detail: format!(
                        "Pattern recurred {count} times; codify its remediation as a playbook"
                    ),
                });
            }
        }

        // Namespaces generating many issues deserve deeper monitoring.
        let mut per_namespace: HashMap<String, u64> = HashMap::new();
        for (key, count) in &counts {
            if let Some((namespace, _)) = key.split_once('/') {
                *per_namespace.entry(namespace.to_string()).or_insert(0) += count;
            }
        }
        for (namespace, count) in per_namespace {
            if count >= 5 {
                suggestions.push(Suggestion {
                    kind: "enhanced_monitoring".to_string(),
                    subject: namespace.clone(),
                    detail: format!(
                        "Namespace {namespace} produced {count} issues; add deep health checks"
                    ),
                });
            }
        }

        // Checks that mostly cry wolf need their thresholds revisited.
        let feedback = self.check_feedback.lock().expect("tuner lock").clone();
        for (check, stats) in feedback {
            if stats.fired >= 2 && stats.false_positives * 2 > stats.fired {
                suggestions.push(Suggestion {
                    kind: "threshold_tuning".to_string(),
                    subject: check.clone(),
                    detail: format!(
                        "Check {check} was a false positive {} of {} times; raise its threshold",
                        stats.false_positives, stats.fired
                    ),
                });
            }
        }

        suggestions
    }

    pub fn stats(&self) -> serde_json::Value {
        let counts = self.issue_counts.lock().expect("tuner lock");
        serde_json::json!({
            "issue_counts": counts.clone(),
            "total_tracked_patterns": counts.len(),
        })
    }

    /// Snapshot of local pattern counts for the classifier's external map.
    pub fn counts_snapshot(&self) -> HashMap<String, u64> {
        self.issue_counts.lock().expect("tuner lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::domain::errors::GuardianResult;
    use crate::domain::models::config::Config;
    use crate::domain::ports::store::NullStore;

    struct CountingPipeline {
        submissions: AtomicU64,
    }

    #[async_trait]
    impl FixPipeline for CountingPipeline {
        async fn submit_goal(
            &self,
            _description: &str,
            _acceptance_criteria: &[String],
        ) -> GuardianResult<serde_json::Value> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"goal_id": "g-1"}))
        }

        async fn loop_status(&self) -> GuardianResult<serde_json::Value> {
            Ok(serde_json::json!({"running": true}))
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn tuner_with_pipeline() -> (SelfTuner, Arc<CountingPipeline>) {
        let pipeline = Arc::new(CountingPipeline {
            submissions: AtomicU64::new(0),
        });
        let config = Arc::new(ConfigStore::new(
            Arc::new(Config::default()),
            Arc::new(NullStore),
        ));
        let tuner = SelfTuner::new(
            Arc::new(NullStore),
            Some(pipeline.clone() as Arc<dyn FixPipeline>),
            config,
        );
        (tuner, pipeline)
    }

    #[tokio::test]
    async fn test_three_successful_recurrences_escalate_once() {
        let (tuner, pipeline) = tuner_with_pipeline();
        let key = "default/web/crashloop";

        tuner.record_issue(key, "restarted pod", true).await;
        tuner.record_issue(key, "restarted pod", true).await;
        assert_eq!(pipeline.submissions.load(Ordering::SeqCst), 0);

        tuner.record_issue(key, "restarted pod", true).await;
        assert_eq!(pipeline.submissions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resolutions_do_not_escalate() {
        let (tuner, pipeline) = tuner_with_pipeline();
        let key = "default/web/crashloop";
        for _ in 0..5 {
            tuner.record_issue(key, "restart attempt", false).await;
        }
        assert_eq!(pipeline.submissions.load(Ordering::SeqCst), 0);
        assert!(tuner.escalation_needed(key).await);
    }

    #[tokio::test]
    async fn test_pattern_key_derivation() {
        assert_eq!(
            SelfTuner::derive_pattern_key("default", "web", "crashloop"),
            "default/web/crashloop"
        );
    }

    #[tokio::test]
    async fn test_suggestions_surface_recurring_and_noisy_namespaces() {
        let (tuner, _) = tuner_with_pipeline();
        for _ in 0..3 {
            tuner.note_occurrence("media/plex/crashloop").await;
        }
        for _ in 0..2 {
            tuner.note_occurrence("media/sonarr/oom").await;
        }
        let suggestions = tuner.suggest_improvements().await;
        assert!(suggestions
            .iter()
            .any(|s| s.kind == "new_playbook" && s.subject == "media/plex/crashloop"));
        assert!(suggestions
            .iter()
            .any(|s| s.kind == "enhanced_monitoring" && s.subject == "media"));
    }

    #[tokio::test]
    async fn test_false_positive_suggestion() {
        let (tuner, _) = tuner_with_pipeline();
        tuner.record_check_feedback("ingress", true);
        tuner.record_check_feedback("ingress", true);
        tuner.record_check_feedback("ingress", false);
        let suggestions = tuner.suggest_improvements().await;
        assert!(suggestions
            .iter()
            .any(|s| s.kind == "threshold_tuning" && s.subject == "ingress"));
    }
}
