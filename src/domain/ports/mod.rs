//! Ports: trait seams between the control plane and its collaborators.
//!
//! Each port is consumed by the services layer and implemented by an
//! adapter under `infrastructure`. All implementations must be
//! `Send + Sync` for concurrent use across tokio tasks.

pub mod cluster;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod telemetry;

pub use cluster::{
    CertificateSummary, ClusterApi, CrashLoopPod, DaemonSetSummary, DeploymentSummary,
    EventRecord, IngressRoute, JobSummary, NodeCondition, NodeSummary, OwnerRef, PodSummary,
    ReplicaSetSummary, ServiceSummary, WorkloadScale,
};
pub use llm::{ChatMessage, ChatModel, ChatResponse, ChatRole, ToolCall, ToolSpec};
pub use memory::{IssueMemory, NullMemory, RecalledIssue};
pub use notify::Notifier;
pub use pipeline::{AnalyzerIssue, ClusterAnalyzer, FixPipeline, Forge};
pub use store::{DurableStore, NullStore};
pub use telemetry::{
    BanDecision, EndpointStatus, FiringAlert, LatencyQuantiles, LogBackend, MetricsBackend,
    NamespaceErrorCount, ResourceUsage, SecurityAlert, SecurityBackend, StatusPage, VolumeUsage,
};
