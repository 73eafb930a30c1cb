//! Redis adapter for the durable-store port.
//!
//! Every operation degrades gracefully: when Redis is down, writes are
//! logged and skipped and reads return empty, pushing callers onto their
//! in-memory fallbacks. The adapter reports `available() == false` in that
//! state so status payloads can surface it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::domain::errors::GuardianResult;
use crate::domain::models::action::{ActionRecord, ApprovalStatus, PendingApproval};
use crate::domain::ports::store::DurableStore;

const KEY_RATE_LIMIT: &str = "guardian:rate_limit";
const KEY_AUDIT_LOG: &str = "guardian:audit_log";
const KEY_LAST_SCAN: &str = "guardian:last_scan";
const KEY_PENDING_APPROVALS: &str = "guardian:pending_approvals";
const KEY_ISSUE_PATTERNS: &str = "guardian:issue_patterns";
const KEY_ESCALATION_PREFIX: &str = "guardian:escalated:";
const KEY_CONFIG: &str = "guardian:config";

const RATE_LIMIT_TTL_SECONDS: i64 = 7200;
const AUDIT_LOG_MAX_LEN: isize = 500;

pub struct RedisStore {
    manager: Option<ConnectionManager>,
    available: AtomicBool,
}

impl RedisStore {
    /// Connect to Redis; a failure yields an unavailable store rather than
    /// an error so the guardian can run without persistence.
    pub async fn connect(url: &str) -> Self {
        match Self::try_connect(url).await {
            Ok(manager) => {
                info!(url, "durable store connected");
                Self {
                    manager: Some(manager),
                    available: AtomicBool::new(true),
                }
            }
            Err(err) => {
                warn!(url, error = %err, "durable store unavailable, running without persistence");
                Self {
                    manager: None,
                    available: AtomicBool::new(false),
                }
            }
        }
    }

    async fn try_connect(url: &str) -> Result<ConnectionManager, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(manager)
    }

    fn connection(&self) -> Option<ConnectionManager> {
        if self.available.load(Ordering::SeqCst) {
            self.manager.clone()
        } else {
            None
        }
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn record_action(&self, member: &str, unix_secs: f64) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let result: Result<(), redis::RedisError> = async {
            let _: i64 = con.zadd(KEY_RATE_LIMIT, member, unix_secs).await?;
            let _: bool = con.expire(KEY_RATE_LIMIT, RATE_LIMIT_TTL_SECONDS).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(error = %err, "record_action skipped");
        }
        Ok(())
    }

    async fn actions_in_window(&self, window_seconds: u64) -> GuardianResult<u64> {
        let Some(mut con) = self.connection() else {
            return Ok(0);
        };
        let cutoff = Utc::now().timestamp() as f64 - window_seconds as f64;
        let result: Result<u64, redis::RedisError> = async {
            let _: i64 = con
                .zrembyscore(KEY_RATE_LIMIT, "-inf", cutoff)
                .await?;
            let count: u64 = con.zcount(KEY_RATE_LIMIT, cutoff, "+inf").await?;
            Ok(count)
        }
        .await;
        match result {
            Ok(count) => Ok(count),
            Err(err) => {
                warn!(error = %err, "actions_in_window read failed");
                Ok(0)
            }
        }
    }

    async fn append_audit(&self, entry: &ActionRecord) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let payload = serde_json::to_string(entry)?;
        let result: Result<(), redis::RedisError> = async {
            let _: i64 = con.lpush(KEY_AUDIT_LOG, payload).await?;
            let _: () = con.ltrim(KEY_AUDIT_LOG, 0, AUDIT_LOG_MAX_LEN - 1).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(error = %err, "append_audit skipped");
        }
        Ok(())
    }

    async fn recent_audit(&self, count: usize) -> GuardianResult<Vec<ActionRecord>> {
        let Some(mut con) = self.connection() else {
            return Ok(Vec::new());
        };
        let raw: Result<Vec<String>, redis::RedisError> =
            con.lrange(KEY_AUDIT_LOG, 0, count as isize - 1).await;
        match raw {
            Ok(items) => Ok(items
                .iter()
                .filter_map(|item| serde_json::from_str(item).ok())
                .collect()),
            Err(err) => {
                warn!(error = %err, "recent_audit read failed");
                Ok(Vec::new())
            }
        }
    }

    async fn store_approval(&self, approval: &PendingApproval) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let payload = serde_json::to_string(approval)?;
        let result: Result<i64, redis::RedisError> =
            con.hset(KEY_PENDING_APPROVALS, &approval.id, payload).await;
        if let Err(err) = result {
            warn!(error = %err, "store_approval skipped");
        }
        Ok(())
    }

    async fn update_approval(&self, id: &str, status: ApprovalStatus) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let result: Result<(), redis::RedisError> = async {
            let raw: Option<String> = con.hget(KEY_PENDING_APPROVALS, id).await?;
            if let Some(raw) = raw {
                if let Ok(mut approval) = serde_json::from_str::<PendingApproval>(&raw) {
                    approval.status = status;
                    let payload =
                        serde_json::to_string(&approval).unwrap_or_else(|_| raw.clone());
                    let _: i64 = con.hset(KEY_PENDING_APPROVALS, id, payload).await?;
                }
            }
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(error = %err, "update_approval skipped");
        }
        Ok(())
    }

    async fn list_approvals(&self) -> GuardianResult<Vec<PendingApproval>> {
        let Some(mut con) = self.connection() else {
            return Ok(Vec::new());
        };
        let raw: Result<HashMap<String, String>, redis::RedisError> =
            con.hgetall(KEY_PENDING_APPROVALS).await;
        match raw {
            Ok(map) => Ok(map
                .values()
                .filter_map(|item| serde_json::from_str(item).ok())
                .collect()),
            Err(err) => {
                warn!(error = %err, "list_approvals read failed");
                Ok(Vec::new())
            }
        }
    }

    async fn increment_pattern(&self, key: &str) -> GuardianResult<u64> {
        let Some(mut con) = self.connection() else {
            return Ok(0);
        };
        let result: Result<i64, redis::RedisError> =
            con.hincr(KEY_ISSUE_PATTERNS, key, 1).await;
        match result {
            Ok(count) => Ok(count.max(0) as u64),
            Err(err) => {
                warn!(error = %err, "increment_pattern skipped");
                Ok(0)
            }
        }
    }

    async fn pattern_count(&self, key: &str) -> GuardianResult<u64> {
        let Some(mut con) = self.connection() else {
            return Ok(0);
        };
        let raw: Result<Option<String>, redis::RedisError> =
            con.hget(KEY_ISSUE_PATTERNS, key).await;
        Ok(raw
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    async fn pattern_counts(&self) -> GuardianResult<HashMap<String, u64>> {
        let Some(mut con) = self.connection() else {
            return Ok(HashMap::new());
        };
        let raw: Result<HashMap<String, String>, redis::RedisError> =
            con.hgetall(KEY_ISSUE_PATTERNS).await;
        match raw {
            Ok(map) => Ok(map
                .into_iter()
                .filter_map(|(k, v)| v.parse().ok().map(|count| (k, count)))
                .collect()),
            Err(err) => {
                warn!(error = %err, "pattern_counts read failed");
                Ok(HashMap::new())
            }
        }
    }

    async fn record_escalation(&self, key: &str, cooldown_seconds: u64) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let full_key = format!("{KEY_ESCALATION_PREFIX}{key}");
        let result: Result<(), redis::RedisError> = async {
            let _: () = con.set(&full_key, "1").await?;
            let _: bool = con.expire(&full_key, cooldown_seconds as i64).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(error = %err, "record_escalation skipped");
        }
        Ok(())
    }

    async fn recently_escalated(&self, key: &str) -> GuardianResult<bool> {
        let Some(mut con) = self.connection() else {
            return Ok(false);
        };
        let raw: Result<Option<String>, redis::RedisError> =
            con.get(format!("{KEY_ESCALATION_PREFIX}{key}")).await;
        Ok(raw.ok().flatten().is_some())
    }

    async fn set_config_override(&self, key: &str, raw: &str) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let result: Result<i64, redis::RedisError> = con.hset(KEY_CONFIG, key, raw).await;
        if let Err(err) = result {
            warn!(error = %err, "set_config_override skipped");
        }
        Ok(())
    }

    async fn get_config_override(&self, key: &str) -> GuardianResult<Option<String>> {
        let Some(mut con) = self.connection() else {
            return Ok(None);
        };
        let raw: Result<Option<String>, redis::RedisError> = con.hget(KEY_CONFIG, key).await;
        Ok(raw.ok().flatten())
    }

    async fn all_config_overrides(&self) -> GuardianResult<HashMap<String, String>> {
        let Some(mut con) = self.connection() else {
            return Ok(HashMap::new());
        };
        let raw: Result<HashMap<String, String>, redis::RedisError> =
            con.hgetall(KEY_CONFIG).await;
        Ok(raw.unwrap_or_default())
    }

    async fn delete_config_override(&self, key: &str) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let result: Result<i64, redis::RedisError> = con.hdel(KEY_CONFIG, key).await;
        if let Err(err) = result {
            warn!(error = %err, "delete_config_override skipped");
        }
        Ok(())
    }

    async fn store_last_scan(&self, result: &serde_json::Value) -> GuardianResult<()> {
        let Some(mut con) = self.connection() else {
            return Ok(());
        };
        let payload = serde_json::to_string(result)?;
        let outcome: Result<(), redis::RedisError> = con.set(KEY_LAST_SCAN, payload).await;
        if let Err(err) = outcome {
            warn!(error = %err, "store_last_scan skipped");
        }
        Ok(())
    }

    async fn last_scan(&self) -> GuardianResult<Option<serde_json::Value>> {
        let Some(mut con) = self.connection() else {
            return Ok(None);
        };
        let raw: Result<Option<String>, redis::RedisError> = con.get(KEY_LAST_SCAN).await;
        Ok(raw
            .ok()
            .flatten()
            .and_then(|payload| serde_json::from_str(&payload).ok()))
    }
}
