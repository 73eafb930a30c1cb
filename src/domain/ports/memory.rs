//! Vector memory port: issue/resolution recall across investigations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::GuardianResult;

/// A past issue retrieved by similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalledIssue {
    pub issue: String,
    pub resolution: String,
    pub score: f64,
    pub timestamp: String,
}

#[async_trait]
pub trait IssueMemory: Send + Sync {
    /// Embed an issue summary and store it with its resolution.
    async fn store_resolution(
        &self,
        issue: &str,
        resolution: &str,
        metadata: serde_json::Value,
    ) -> GuardianResult<()>;

    /// Return the `top_k` most similar past issues for a query.
    async fn recall_similar(&self, query: &str, top_k: usize)
        -> GuardianResult<Vec<RecalledIssue>>;

    fn available(&self) -> bool;
}

/// Memory that remembers nothing; used when no vector store is configured.
#[derive(Debug, Default, Clone)]
pub struct NullMemory;

#[async_trait]
impl IssueMemory for NullMemory {
    async fn store_resolution(
        &self,
        _issue: &str,
        _resolution: &str,
        _metadata: serde_json::Value,
    ) -> GuardianResult<()> {
        Ok(())
    }

    async fn recall_similar(
        &self,
        _query: &str,
        _top_k: usize,
    ) -> GuardianResult<Vec<RecalledIssue>> {
        Ok(Vec::new())
    }

    fn available(&self) -> bool {
        false
    }
}
