//! Durable store port.
//!
//! The durable store is authoritative for cross-restart state: the
//! rate-limit window, the audit log, pending approvals, pattern counters,
//! escalation cool-downs, runtime config overrides, and the last scan
//! result. In-memory structures elsewhere are caches over this.
//!
//! All operations degrade gracefully: when the store is down, reads return
//! empty and writes are skipped by the adapter, which reports
//! `available() == false`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::GuardianResult;
use crate::domain::models::action::{ActionRecord, ApprovalStatus, PendingApproval};

#[async_trait]
pub trait DurableStore: Send + Sync {
    fn available(&self) -> bool;

    // Rate limiting: time-ordered set keyed by `ISO-8601|action`,
    // score = unix seconds.
    async fn record_action(&self, member: &str, unix_secs: f64) -> GuardianResult<()>;
    /// Prune entries older than the window, then count what remains.
    async fn actions_in_window(&self, window_seconds: u64) -> GuardianResult<u64>;

    // Audit log: list-appendable, trimmed to a bounded length.
    async fn append_audit(&self, entry: &ActionRecord) -> GuardianResult<()>;
    async fn recent_audit(&self, count: usize) -> GuardianResult<Vec<ActionRecord>>;

    // Pending approvals
    async fn store_approval(&self, approval: &PendingApproval) -> GuardianResult<()>;
    async fn update_approval(&self, id: &str, status: ApprovalStatus) -> GuardianResult<()>;
    async fn list_approvals(&self) -> GuardianResult<Vec<PendingApproval>>;

    // Pattern counters and escalation cool-downs
    async fn increment_pattern(&self, key: &str) -> GuardianResult<u64>;
    async fn pattern_count(&self, key: &str) -> GuardianResult<u64>;
    async fn pattern_counts(&self) -> GuardianResult<HashMap<String, u64>>;
    async fn record_escalation(&self, key: &str, cooldown_seconds: u64) -> GuardianResult<()>;
    async fn recently_escalated(&self, key: &str) -> GuardianResult<bool>;

    // Runtime config overrides (string-serialized, validated by the store
    // layer above this port)
    async fn set_config_override(&self, key: &str, raw: &str) -> GuardianResult<()>;
    async fn get_config_override(&self, key: &str) -> GuardianResult<Option<String>>;
    async fn all_config_overrides(&self) -> GuardianResult<HashMap<String, String>>;
    async fn delete_config_override(&self, key: &str) -> GuardianResult<()>;

    // Last scan result
    async fn store_last_scan(&self, result: &serde_json::Value) -> GuardianResult<()>;
    async fn last_scan(&self) -> GuardianResult<Option<serde_json::Value>>;
}

/// No-op store used when no durable backend is configured.
///
/// Always reports unavailable; every write is a no-op and every read is
/// empty, which pushes callers onto their in-memory fallbacks.
#[derive(Debug, Default, Clone)]
pub struct NullStore;

#[async_trait]
impl DurableStore for NullStore {
    fn available(&self) -> bool {
        false
    }

    async fn record_action(&self, _member: &str, _unix_secs: f64) -> GuardianResult<()> {
        Ok(())
    }

    async fn actions_in_window(&self, _window_seconds: u64) -> GuardianResult<u64> {
        Ok(0)
    }

    async fn append_audit(&self, _entry: &ActionRecord) -> GuardianResult<()> {
        Ok(())
    }

    async fn recent_audit(&self, _count: usize) -> GuardianResult<Vec<ActionRecord>> {
        Ok(Vec::new())
    }

    async fn store_approval(&self, _approval: &PendingApproval) -> GuardianResult<()> {
        Ok(())
    }

    async fn update_approval(&self, _id: &str, _status: ApprovalStatus) -> GuardianResult<()> {
        Ok(())
    }

    async fn list_approvals(&self) -> GuardianResult<Vec<PendingApproval>> {
        Ok(Vec::new())
    }

    async fn increment_pattern(&self, _key: &str) -> GuardianResult<u64> {
        Ok(0)
    }

    async fn pattern_count(&self, _key: &str) -> GuardianResult<u64> {
        Ok(0)
    }

    async fn pattern_counts(&self) -> GuardianResult<HashMap<String, u64>> {
        Ok(HashMap::new())
    }

    async fn record_escalation(&self, _key: &str, _cooldown_seconds: u64) -> GuardianResult<()> {
        Ok(())
    }

    async fn recently_escalated(&self, _key: &str) -> GuardianResult<bool> {
        Ok(false)
    }

    async fn set_config_override(&self, _key: &str, _raw: &str) -> GuardianResult<()> {
        Ok(())
    }

    async fn get_config_override(&self, _key: &str) -> GuardianResult<Option<String>> {
        Ok(None)
    }

    async fn all_config_overrides(&self) -> GuardianResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    async fn delete_config_override(&self, _key: &str) -> GuardianResult<()> {
        Ok(())
    }

    async fn store_last_scan(&self, _result: &serde_json::Value) -> GuardianResult<()> {
        Ok(())
    }

    async fn last_scan(&self) -> GuardianResult<Option<serde_json::Value>> {
        Ok(None)
    }
}
