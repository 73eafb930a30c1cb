//! Runtime configuration store.
//!
//! Durable-store-backed overrides layered above the process configuration.
//! Every write is validated against the runtime key schema before it is
//! persisted; reads prefer the override and fall back to the environment
//! default, so operator edits take effect within one loop iteration without
//! a restart.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::models::config::{runtime_kind, Config, ConfigKind, RUNTIME_KEYS};
use crate::domain::ports::store::DurableStore;

pub struct ConfigStore {
    defaults: Value,
    config: Arc<Config>,
    store: Arc<dyn DurableStore>,
}

impl ConfigStore {
    pub fn new(config: Arc<Config>, store: Arc<dyn DurableStore>) -> Self {
        let defaults = serde_json::to_value(config.as_ref())
            .expect("Config always serializes to a JSON object");
        Self {
            defaults,
            config,
            store,
        }
    }

    /// The startup configuration this store falls back to.
    pub fn base(&self) -> &Config {
        &self.config
    }

    fn default_value(&self, key: &str) -> Option<Value> {
        self.defaults.get(key).cloned()
    }

    /// Read a configuration value: durable override first, environment
    /// default otherwise. Only the runtime key schema is addressable.
    pub async fn get(&self, key: &str) -> GuardianResult<Value> {
        let kind = runtime_kind(key)
            .ok_or_else(|| GuardianError::Config(format!("unknown configuration key: {key}")))?;

        if self.store.available() {
            match self.store.get_config_override(key).await {
                Ok(Some(raw)) => match deserialize_value(kind, &raw) {
                    Ok(value) => {
                        debug!(key, "config override read from durable store");
                        return Ok(value);
                    }
                    Err(err) => {
                        warn!(key, error = %err, "corrupt config override, using default");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    warn!(key, error = %err, "config read failed, using default");
                }
            }
        }

        self.default_value(key)
            .ok_or_else(|| GuardianError::Config(format!("no default for key: {key}")))
    }

    /// Validate and persist a runtime override.
    pub async fn set(&self, key: &str, value: &Value) -> GuardianResult<()> {
        let kind = runtime_kind(key)
            .ok_or_else(|| GuardianError::Config(format!("unknown configuration key: {key}")))?;
        let raw = serialize_value(kind, value)
            .ok_or_else(|| GuardianError::Config(format!("validation failed for {key}={value}")))?;

        if !self.store.available() {
            return Err(GuardianError::unavailable(
                "durable store",
                "cannot persist runtime config",
            ));
        }
        self.store.set_config_override(key, &raw).await?;
        tracing::info!(key, value = %raw, "config override set");
        Ok(())
    }

    /// Delete a runtime override, reverting to the environment default.
    pub async fn reset(&self, key: &str) -> GuardianResult<()> {
        runtime_kind(key)
            .ok_or_else(|| GuardianError::Config(format!("unknown configuration key: {key}")))?;
        if !self.store.available() {
            return Err(GuardianError::unavailable(
                "durable store",
                "cannot reset runtime config",
            ));
        }
        self.store.delete_config_override(key).await?;
        tracing::info!(key, "config override reset");
        Ok(())
    }

    /// Merged view of every runtime key: overrides above defaults.
    pub async fn all(&self) -> serde_json::Map<String, Value> {
        let mut merged = serde_json::Map::new();
        for (key, _) in RUNTIME_KEYS {
            if let Some(value) = self.default_value(key) {
                merged.insert((*key).to_string(), value);
            }
        }
        if self.store.available() {
            match self.store.all_config_overrides().await {
                Ok(overrides) => {
                    for (key, raw) in overrides {
                        if let Some(kind) = runtime_kind(&key) {
                            if let Ok(value) = deserialize_value(kind, &raw) {
                                merged.insert(key, value);
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, "config overrides read failed, defaults only"),
            }
        }
        merged
    }

    // Typed helpers for per-use reads on the hot paths. Known keys always
    // have a default, so these cannot miss.

    pub async fn get_u64(&self, key: &str) -> u64 {
        self.get(key).await.ok().and_then(|v| v.as_u64()).unwrap_or(0)
    }

    pub async fn get_f64(&self, key: &str) -> f64 {
        self.get(key).await.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    pub async fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub async fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .await
            .ok()
            .and_then(|v| {
                v.as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(ToString::to_string))
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

/// Convert a JSON value into the store's string form, validating its kind.
/// Strings holding the right shape are coerced (so PATCH bodies may send
/// `"30"` for an int).
fn serialize_value(kind: ConfigKind, value: &Value) -> Option<String> {
    match kind {
        ConfigKind::Bool => match value {
            Value::Bool(b) => Some(b.to_string()),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some("true".to_string()),
                "false" | "0" | "no" => Some("false".to_string()),
                _ => None,
            },
            _ => None,
        },
        ConfigKind::Int => match value {
            Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
            Value::String(s) => s.trim().parse::<i64>().ok().map(|n| n.to_string()),
            _ => None,
        },
        ConfigKind::Float => match value {
            Value::Number(n) => n.as_f64().map(|f| f.to_string()),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.to_string()),
            _ => None,
        },
        ConfigKind::Str => value.as_str().map(ToString::to_string),
        ConfigKind::StrList => match value {
            Value::Array(items) => {
                let strings: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
                strings.map(|s| serde_json::to_string(&s).expect("string list serializes"))
            }
            Value::String(raw) => {
                let parsed: Vec<String> = serde_json::from_str(raw).ok()?;
                Some(serde_json::to_string(&parsed).expect("string list serializes"))
            }
            _ => None,
        },
    }
}

/// Convert a stored string back to a typed JSON value.
fn deserialize_value(kind: ConfigKind, raw: &str) -> GuardianResult<Value> {
    let bad = |msg: &str| GuardianError::Config(format!("{msg}: {raw}"));
    match kind {
        ConfigKind::Bool => Ok(Value::Bool(matches!(
            raw.to_lowercase().as_str(),
            "true" | "1" | "yes"
        ))),
        ConfigKind::Int => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad("expected integer")),
        ConfigKind::Float => raw
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| bad("expected float")),
        ConfigKind::Str => Ok(Value::String(raw.to_string())),
        ConfigKind::StrList => {
            let parsed: Vec<String> =
                serde_json::from_str(raw).map_err(|_| bad("expected string list"))?;
            Ok(serde_json::json!(parsed))
        }
    }
}
