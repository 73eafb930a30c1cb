//! Action records, gateway outcomes, and pending approvals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal result of a mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    Success,
    Failed,
    /// Denied by policy before reaching the orchestrator; consumes no
    /// rate budget.
    Blocked,
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    /// Whether this result counts against the rolling action budget.
    pub fn counts_against_budget(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One entry in the audit log, appended on every mutation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub target: String,
    pub namespace: String,
    pub reason: String,
    pub result: ActionResult,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ActionRecord {
    pub fn new(
        action: impl Into<String>,
        target: impl Into<String>,
        namespace: impl Into<String>,
        reason: impl Into<String>,
        result: ActionResult,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            target: target.into(),
            namespace: namespace.into(),
            reason: reason.into(),
            result,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Member string for the rate-limit sorted set: `ISO-8601|action`.
    pub fn rate_member(&self) -> String {
        format!("{}|{}", self.timestamp.to_rfc3339(), self.action)
    }
}

/// Structured outcome the gateway hands back to its callers.
///
/// Policy denials and orchestrator failures both land here; they are data,
/// not errors, so the agent can read them and choose another path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            requires_approval: false,
            approval_id: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            requires_approval: false,
            approval_id: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn approval_required(error: impl Into<String>, approval_id: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            requires_approval: true,
            approval_id: Some(approval_id.into()),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Render for a tool result.
    pub fn to_tool_result(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A mutation waiting for human consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    pub action: String,
    pub target: String,
    pub namespace: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

impl PendingApproval {
    pub fn new(
        action: impl Into<String>,
        target: impl Into<String>,
        namespace: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            target: target.into(),
            namespace: namespace.into(),
            reason: reason.into(),
            created_at: Utc::now(),
            status: ApprovalStatus::Pending,
        }
    }
}
