//! Infrastructure layer: adapters implementing the domain ports.

pub mod config;
pub mod dev_controller;
pub mod gatus;
pub mod github;
pub mod k8sgpt;
pub mod kube;
pub mod llm;
pub mod logging;
pub mod loki;
pub mod notify;
pub mod prometheus;
pub mod qdrant;
pub mod redis_store;
pub mod security;
