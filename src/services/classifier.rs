//! Escalation classifier.
//!
//! Assigns each anomaly an escalation level so the dispatcher knows whether
//! to hand it to the agent, route it to the long-term pipeline, or just
//! watch. The decision depends only on the inputs plus accumulated
//! occurrence counts.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::models::escalation::{Escalation, EscalationLevel};
use crate::domain::models::signal::{AnomalySignal, Severity, SignalSource};

const QUICK_FIX_SOURCES: &[SignalSource] = &[
    SignalSource::K8sCrashloop,
    SignalSource::Gatus,
    SignalSource::Daemonset,
];

const LONG_TERM_SOURCES: &[SignalSource] = &[SignalSource::NodeCondition];

const QUICK_FIX_KEYWORDS: &[&str] = &[
    "restart",
    "crashloop",
    "oomkilled",
    "oom",
    "backoff",
    "failed job",
    "rollout stuck",
    "unhealthy endpoint",
];

const LONG_TERM_KEYWORDS: &[&str] = &[
    "memory limit",
    "resource limit",
    "config change",
    "recurring",
    "disk pressure",
    "pid pressure",
    "node not ready",
];

pub struct EscalationClassifier {
    recurring_threshold: u64,
    occurrence_counts: Mutex<HashMap<String, u64>>,
}

impl EscalationClassifier {
    pub fn new(recurring_threshold: u64) -> Self {
        Self {
            recurring_threshold,
            occurrence_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Classify a signal. `external_counts` carries the self-tuner's
    /// pattern counters so recurrences survive restarts.
    ///
    /// Decision order, first match wins:
    /// 1. combined occurrence count at or above the threshold
    /// 2. source-based rules
    /// 3. keyword match on lowercased title + details
    /// 4. severity fallback
    pub fn classify(
        &self,
        signal: &AnomalySignal,
        external_counts: Option<&HashMap<String, u64>>,
    ) -> Escalation {
        let text = format!("{} {}", signal.title, signal.details).to_lowercase();

        let local_count = {
            let mut counts = self.occurrence_counts.lock().expect("classifier lock");
            let entry = counts.entry(signal.dedupe_key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let external = external_counts.map_or(0, |counts| {
            counts
                .get(&signal.dedupe_key)
                .copied()
                .max(counts.get(signal.source.as_str()).copied())
                .unwrap_or(0)
        });

        let total = local_count.max(external);
        if total >= self.recurring_threshold {
            return Escalation::new(
                EscalationLevel::LongTerm,
                format!("recurring: seen {total} times (threshold {})", self.recurring_threshold),
            );
        }

        if LONG_TERM_SOURCES.contains(&signal.source) {
            return Escalation::new(
                EscalationLevel::LongTerm,
                format!("source {} needs a durable fix", signal.source),
            );
        }
        if QUICK_FIX_SOURCES.contains(&signal.source) {
            return Escalation::new(
                EscalationLevel::QuickFix,
                format!("source {} is directly remediable", signal.source),
            );
        }

        for kw in LONG_TERM_KEYWORDS {
            if text.contains(kw) {
                return Escalation::new(
                    EscalationLevel::LongTerm,
                    format!("matched long-term keyword '{kw}'"),
                );
            }
        }
        for kw in QUICK_FIX_KEYWORDS {
            if text.contains(kw) {
                return Escalation::new(
                    EscalationLevel::QuickFix,
                    format!("matched quick-fix keyword '{kw}'"),
                );
            }
        }

        match signal.severity {
            Severity::Critical => {
                Escalation::new(EscalationLevel::QuickFix, "critical severity fallback")
            }
            Severity::Info => {
                Escalation::new(EscalationLevel::ObservationOnly, "info severity fallback")
            }
            Severity::Warning => {
                Escalation::new(EscalationLevel::QuickFix, "warning severity fallback")
            }
        }
    }

    /// Number of distinct dedupe keys seen so far.
    pub fn tracked_keys(&self) -> usize {
        self.occurrence_counts.lock().expect("classifier lock").len()
    }

    pub fn stats(&self) -> serde_json::Value {
        let counts = self.occurrence_counts.lock().expect("classifier lock");
        serde_json::json!({
            "tracked_keys": counts.len(),
            "recurring_threshold": self.recurring_threshold,
            "occurrence_counts": counts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(source: SignalSource, severity: Severity, title: &str, details: &str) -> AnomalySignal {
        AnomalySignal {
            source,
            severity,
            title: title.into(),
            details: details.into(),
            namespace: "default".into(),
            resource: "web".into(),
            dedupe_key: format!("{}:{title}", source.as_str()),
        }
    }

    #[test]
    fn test_crashloop_source_is_quick_fix() {
        let classifier = EscalationClassifier::new(3);
        let sig = signal(
            SignalSource::K8sCrashloop,
            Severity::Critical,
            "CrashLoopBackOff: default/web",
            "",
        );
        assert_eq!(classifier.classify(&sig, None).level, EscalationLevel::QuickFix);
    }

    #[test]
    fn test_node_condition_source_is_long_term() {
        let classifier = EscalationClassifier::new(3);
        let sig = signal(
            SignalSource::NodeCondition,
            Severity::Warning,
            "Node condition",
            "MemoryPressure on node-1",
        );
        assert_eq!(classifier.classify(&sig, None).level, EscalationLevel::LongTerm);
    }

    #[test]
    fn test_long_term_keywords_win_over_quick_fix() {
        let classifier = EscalationClassifier::new(3);
        let sig = signal(
            SignalSource::Prometheus,
            Severity::Warning,
            "Alert firing",
            "pod hit its memory limit and restarted",
        );
        // "memory limit" (long-term) checked before "restart" (quick-fix)
        assert_eq!(classifier.classify(&sig, None).level, EscalationLevel::LongTerm);
    }

    #[test]
    fn test_recurring_signals_escalate_to_long_term() {
        let classifier = EscalationClassifier::new(3);
        let sig = signal(SignalSource::K8sCrashloop, Severity::Critical, "crash", "");
        assert_eq!(classifier.classify(&sig, None).level, EscalationLevel::QuickFix);
        assert_eq!(classifier.classify(&sig, None).level, EscalationLevel::QuickFix);
        let third = classifier.classify(&sig, None);
        assert_eq!(third.level, EscalationLevel::LongTerm);
        assert!(third.reason.contains("recurring"));
    }

    #[test]
    fn test_external_counts_contribute() {
        let classifier = EscalationClassifier::new(3);
        let sig = signal(SignalSource::Prometheus, Severity::Warning, "flap", "");
        let mut external = HashMap::new();
        external.insert(sig.dedupe_key.clone(), 5u64);
        assert_eq!(
            classifier.classify(&sig, Some(&external)).level,
            EscalationLevel::LongTerm
        );
    }

    #[test]
    fn test_severity_fallbacks() {
        let classifier = EscalationClassifier::new(30);
        let info = signal(SignalSource::K8sEvents, Severity::Info, "note", "nothing notable");
        assert_eq!(
            classifier.classify(&info, None).level,
            EscalationLevel::ObservationOnly
        );
        let critical = signal(SignalSource::K8sEvents, Severity::Critical, "bad", "something");
        assert_eq!(
            classifier.classify(&critical, None).level,
            EscalationLevel::QuickFix
        );
    }
}
