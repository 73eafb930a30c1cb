//! Services layer: the six core subsystems plus their shared plumbing.

pub mod agent;
pub mod broadcast;
pub mod checks;
pub mod classifier;
pub mod correlator;
pub mod gateway;
pub mod monitor;
pub mod playbooks;
pub mod quiet_hours;
pub mod quorum;
pub mod scanner;
pub mod self_tuner;

use futures::future::BoxFuture;
use std::sync::Arc;

/// Callback that launches an investigation: (description, thread_id).
///
/// Both the monitor dispatcher and the incident correlator hand off to the
/// agent through this seam so neither depends on the orchestrator directly.
pub type InvestigateFn = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

pub use broadcast::{BroadcastHub, BroadcastKind, BroadcastMessage};
pub use classifier::EscalationClassifier;
pub use correlator::IncidentCorrelator;
pub use gateway::ActionGateway;
pub use monitor::ContinuousMonitor;
pub use quorum::QuorumEvaluator;
pub use scanner::ClusterScanner;
pub use self_tuner::SelfTuner;
