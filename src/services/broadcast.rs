//! Broadcast hub for real-time updates.
//!
//! A broadcast channel fanning typed messages out to WebSocket clients and
//! any internal subscriber. Publishing never blocks and never fails: with
//! no subscribers the message is dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Message types on the wire, matching the WebSocket schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    ScanComplete,
    HealthUpdate,
    AlertReceived,
    SecurityAlert,
    AnomalyDetected,
    InvestigationStarted,
    InvestigationStep,
    InvestigationCompleted,
    QuorumVote,
    Pong,
}

impl BroadcastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanComplete => "scan_complete",
            Self::HealthUpdate => "health_update",
            Self::AlertReceived => "alert_received",
            Self::SecurityAlert => "security_alert",
            Self::AnomalyDetected => "anomaly_detected",
            Self::InvestigationStarted => "investigation_started",
            Self::InvestigationStep => "investigation_step",
            Self::InvestigationCompleted => "investigation_completed",
            Self::QuorumVote => "quorum_vote",
            Self::Pong => "pong",
        }
    }
}

/// Envelope shipped to every subscriber:
/// `{type, timestamp, investigation_id?, data}`.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: BroadcastKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<String>,
    pub data: serde_json::Value,
}

pub struct BroadcastHub {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a message to all subscribers.
    pub fn publish(
        &self,
        kind: BroadcastKind,
        investigation_id: Option<String>,
        data: serde_json::Value,
    ) {
        let message = BroadcastMessage {
            kind,
            timestamp: Utc::now(),
            investigation_id,
            data,
        };
        // Send errors just mean there are no subscribers right now.
        let _ = self.sender.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1024)
    }
}
