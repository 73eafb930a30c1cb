//! Investigations: one execution of the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationStatus {
    Running,
    Completed,
    Failed,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A single step of an agent run: either model reasoning or a tool round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationStep {
    /// Graph node that produced this step ("agent" or "tools").
    pub node: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl InvestigationStep {
    pub fn new(node: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One execution of the agent loop targeting an incident or a user request.
///
/// Terminal states honor two invariants: `Completed` always carries a
/// non-empty summary, `Failed` always carries a non-empty error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: Uuid,
    pub description: String,
    pub thread_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub steps: Vec<InvestigationStep>,
    pub actions_taken: Vec<String>,
    pub summary: String,
    pub error: Option<String>,
    pub status: InvestigationStatus,
}

impl Investigation {
    pub fn start(description: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            thread_id: thread_id.into(),
            started_at: Utc::now(),
            duration_seconds: 0.0,
            steps: Vec::new(),
            actions_taken: Vec::new(),
            summary: String::new(),
            error: None,
            status: InvestigationStatus::Running,
        }
    }

    pub fn add_step(&mut self, step: InvestigationStep) {
        self.steps.push(step);
    }

    pub fn complete(&mut self, summary: impl Into<String>) {
        let summary = summary.into();
        self.summary = if summary.trim().is_empty() {
            "Investigation completed with no findings.".to_string()
        } else {
            summary
        };
        self.status = InvestigationStatus::Completed;
        self.stamp_duration();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "unknown agent error".to_string()
        } else {
            error
        };
        self.summary = format!("Investigation failed: {error}");
        self.error = Some(error);
        self.status = InvestigationStatus::Failed;
        self.stamp_duration();
    }

    fn stamp_duration(&mut self) {
        let elapsed = Utc::now() - self.started_at;
        self.duration_seconds = (elapsed.num_milliseconds().max(0) as f64) / 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_has_nonempty_summary() {
        let mut inv = Investigation::start("check pod", "thread-1");
        inv.complete("");
        assert_eq!(inv.status, InvestigationStatus::Completed);
        assert!(!inv.summary.is_empty());
        assert!(inv.duration_seconds >= 0.0);
    }

    #[test]
    fn test_failed_has_nonempty_error() {
        let mut inv = Investigation::start("check pod", "thread-1");
        inv.fail("LLM timeout");
        assert_eq!(inv.status, InvestigationStatus::Failed);
        assert_eq!(inv.error.as_deref(), Some("LLM timeout"));
        assert!(inv.summary.contains("LLM timeout"));
    }
}
