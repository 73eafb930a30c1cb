//! Cluster Guardian - agentic SRE control plane for Kubernetes
//!
//! A signal-to-action pipeline with:
//! - Continuous fast-loop monitoring and event watching (no LLM on the hot path)
//! - Incident correlation with debounced investigation dispatch
//! - Escalation classification (quick-fix / long-term / observe-only)
//! - A bounded tool-using LLM agent with quorum-gated destructive actions
//! - A rate-limited, namespace-protected action gateway with a durable audit log
//! - Self-tuning of sampling cadence and auto-escalation of recurring issues

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::config::Config;
pub use services::broadcast::BroadcastHub;
