//! Kubernetes REST adapter for the orchestrator port.

pub mod client;
pub mod types;

pub use client::KubeApiClient;
