//! Escalation levels assigned to incidents by the classifier.

use serde::{Deserialize, Serialize};

/// Which track an incident is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    /// The agent may handle it directly (restart, rollback, scale).
    QuickFix,
    /// Needs a permanent fix: hand off to the long-term pipeline.
    LongTerm,
    /// Log and watch; no action.
    ObservationOnly,
}

impl EscalationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickFix => "quick_fix",
            Self::LongTerm => "long_term",
            Self::ObservationOnly => "observation_only",
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classification decision: the level plus the rule that produced it.
/// Derived per dispatch and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Escalation {
    pub level: EscalationLevel,
    pub reason: String,
}

impl Escalation {
    pub fn new(level: EscalationLevel, reason: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
        }
    }
}
