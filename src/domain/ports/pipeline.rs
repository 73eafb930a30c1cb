//! Ports for the long-term-fix pipeline, the cluster-analysis helper, and
//! the code forge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::GuardianResult;

/// External pipeline that turns recurring issues into permanent fixes.
#[async_trait]
pub trait FixPipeline: Send + Sync {
    /// Submit a structured goal (description + acceptance criteria).
    async fn submit_goal(
        &self,
        description: &str,
        acceptance_criteria: &[String],
    ) -> GuardianResult<serde_json::Value>;

    async fn loop_status(&self) -> GuardianResult<serde_json::Value>;

    async fn health_check(&self) -> bool;
}

/// An issue found by the cluster-analysis helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerIssue {
    pub kind: String,
    pub name: String,
    pub error: String,
    #[serde(default)]
    pub details: String,
}

/// Optional cluster-analysis helper (transport chosen per deployment).
#[async_trait]
pub trait ClusterAnalyzer: Send + Sync {
    async fn issues(&self) -> GuardianResult<Vec<AnalyzerIssue>>;
    async fn available(&self) -> bool;
}

/// Forge port: creating fix pull requests.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Create a branch with a single file change and open a PR; returns the
    /// PR URL.
    async fn create_fix_pr(
        &self,
        title: &str,
        body: &str,
        branch: &str,
        file_path: &str,
        file_content: &str,
    ) -> GuardianResult<String>;
}
