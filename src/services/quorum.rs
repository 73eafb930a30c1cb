//! LLM quorum for destructive remediation decisions.
//!
//! Before a gated tool executes, N independent inferences with distinct
//! persona prompts vote on the proposed action. Malformed or timed-out
//! votes count as rejections. Approval requires the approve ratio to
//! exceed the threshold strictly.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::domain::ports::llm::{ChatMessage, ChatModel};

/// Tools that require quorum approval before execution.
pub const QUORUM_REQUIRED_TOOLS: &[&str] = &[
    "restart_pod",
    "rollout_restart_deployment",
    "rollout_restart_statefulset",
    "scale_deployment",
    "cordon_node",
    "drain_node",
    "delete_failed_job",
    "rollback_deployment",
];

/// Perspective prompts for diverse evaluation.
const AGENT_PERSPECTIVES: &[&str] = &[
    "You are a cautious SRE focused on stability. Err on the side of not \
     taking action. Only approve if the evidence clearly shows the action \
     will resolve the issue without side effects.",
    "You are a pragmatic SRE focused on resolving issues quickly. Approve \
     actions when the evidence supports them. Weigh the cost of inaction \
     (prolonged outage) against the risk of action.",
    "You are a senior SRE focused on root cause analysis. Only approve \
     actions that address the root cause, not symptoms. Reject if the \
     proposed action is a band-aid that will mask deeper issues.",
];

/// A single agent's vote on a proposed action.
#[derive(Debug, Clone, Serialize)]
pub struct QuorumVote {
    pub agent_id: String,
    pub approved: bool,
    pub reasoning: String,
    pub confidence: f64,
}

/// Aggregated result from all quorum agents.
#[derive(Debug, Clone, Serialize)]
pub struct QuorumResult {
    pub action: String,
    pub target: String,
    pub approved: bool,
    pub votes: Vec<QuorumVote>,
    pub consensus_ratio: f64,
    pub threshold: f64,
    pub dissenting_reasons: Vec<String>,
}

impl QuorumResult {
    /// Tool-result text for a rejected action. Starts with the literal
    /// `BLOCKED by quorum` marker the agent recognizes.
    pub fn blocked_message(&self) -> String {
        let reasons = if self.dissenting_reasons.is_empty() {
            "majority voted against".to_string()
        } else {
            self.dissenting_reasons.join("; ")
        };
        format!(
            "BLOCKED by quorum ({:.0}% approved, threshold >{:.0}% required). Reasons: {reasons}",
            self.consensus_ratio * 100.0,
            self.threshold * 100.0,
        )
    }
}

pub struct QuorumEvaluator {
    model: Arc<dyn ChatModel>,
    num_agents: usize,
    threshold: f64,
    timeout: Duration,
}

impl QuorumEvaluator {
    pub fn new(model: Arc<dyn ChatModel>, num_agents: usize, threshold: f64) -> Self {
        Self {
            model,
            num_agents: num_agents.clamp(1, AGENT_PERSPECTIVES.len()),
            threshold,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fan out to N independent evaluations and aggregate the votes.
    pub async fn evaluate_action(
        &self,
        action: &str,
        target: &str,
        context: &str,
        agent_reasoning: &str,
    ) -> QuorumResult {
        let prompt = format!(
            "A Kubernetes SRE agent proposes the following action:\n\n\
             Action: {action}\nTarget: {target}\n\n\
             Context:\n{context}\n\n\
             Agent's reasoning:\n{agent_reasoning}\n\n\
             Should this action be taken? Respond with ONLY a JSON object:\n\
             {{\"approved\": true/false, \"reasoning\": \"your reasoning\", \"confidence\": 0.0-1.0}}"
        );

        let futures = (0..self.num_agents).map(|i| {
            let agent_id = format!("agent-{}", i + 1);
            let perspective = AGENT_PERSPECTIVES[i];
            let prompt = prompt.clone();
            async move { self.evaluate_single(agent_id, perspective, &prompt).await }
        });

        let votes: Vec<QuorumVote> = join_all(futures).await;

        let approve_count = votes.iter().filter(|v| v.approved).count();
        let consensus_ratio = approve_count as f64 / votes.len() as f64;
        let approved = consensus_ratio > self.threshold;
        let dissenting = votes
            .iter()
            .filter(|v| v.approved != approved)
            .map(|v| v.reasoning.clone())
            .collect();

        QuorumResult {
            action: action.to_string(),
            target: target.to_string(),
            approved,
            votes,
            consensus_ratio,
            threshold: self.threshold,
            dissenting_reasons: dissenting,
        }
    }

    async fn evaluate_single(
        &self,
        agent_id: String,
        perspective: &str,
        prompt: &str,
    ) -> QuorumVote {
        let messages = vec![ChatMessage::system(perspective), ChatMessage::user(prompt)];

        let response =
            tokio::time::timeout(self.timeout, self.model.chat(&messages, &[])).await;

        match response {
            Ok(Ok(reply)) => {
                let content = reply.content.trim().to_string();
                match parse_vote_json(&content) {
                    Some(parsed) => QuorumVote {
                        agent_id,
                        approved: parsed["approved"].as_bool().unwrap_or(false),
                        reasoning: parsed["reasoning"]
                            .as_str()
                            .map_or_else(|| content.clone(), ToString::to_string),
                        confidence: parsed["confidence"].as_f64().unwrap_or(0.5),
                    },
                    None => QuorumVote {
                        agent_id,
                        approved: false,
                        reasoning: format!("unparseable vote: {content}"),
                        confidence: 0.0,
                    },
                }
            }
            Ok(Err(err)) => {
                warn!(agent = %agent_id, error = %err, "quorum agent failed");
                QuorumVote {
                    agent_id,
                    approved: false,
                    reasoning: format!("agent error: {err}"),
                    confidence: 0.0,
                }
            }
            Err(_) => QuorumVote {
                agent_id,
                approved: false,
                reasoning: "agent timed out".to_string(),
                confidence: 0.0,
            },
        }
    }
}

/// Extract a JSON object from an LLM reply, tolerating markdown fences.
pub fn parse_vote_json(content: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(content) {
        return Some(value);
    }

    if content.contains("```") {
        for part in content.split("```") {
            let mut text = part.trim();
            if let Some(stripped) = text.strip_prefix("json") {
                text = stripped.trim();
            }
            if let Ok(value) = serde_json::from_str(text) {
                return Some(value);
            }
        }
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end > start {
        serde_json::from_str(&content[start..=end]).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::errors::GuardianResult;
    use crate::domain::ports::llm::{ChatResponse, ToolSpec};

    /// Model that hands out one canned reply per call, in order.
    struct ScriptedModel {
        replies: Vec<String>,
        cursor: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies.iter().map(ToString::to_string).collect(),
                cursor: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> GuardianResult<ChatResponse> {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
            let content = self
                .replies
                .get(idx % self.replies.len())
                .cloned()
                .unwrap_or_default();
            Ok(ChatResponse {
                content,
                tool_calls: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_two_rejections_of_three_block() {
        let model = ScriptedModel::new(&[
            r#"{"approved": true, "reasoning": "evidence is clear", "confidence": 0.9}"#,
            r#"{"approved": false, "reasoning": "too risky", "confidence": 0.8}"#,
            r#"{"approved": false, "reasoning": "symptom fix", "confidence": 0.7}"#,
        ]);
        let evaluator = QuorumEvaluator::new(model, 3, 0.5);
        let result = evaluator
            .evaluate_action("restart_pod", "default/web-1", "pod crash looping", "")
            .await;

        assert!(!result.approved);
        assert!((result.consensus_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert!(result.blocked_message().starts_with("BLOCKED by quorum"));
        assert_eq!(result.dissenting_reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_majority_approval_passes() {
        let model = ScriptedModel::new(&[
            r#"{"approved": true, "reasoning": "ok", "confidence": 0.9}"#,
            r#"{"approved": true, "reasoning": "ok", "confidence": 0.9}"#,
            r#"{"approved": false, "reasoning": "no", "confidence": 0.4}"#,
        ]);
        let evaluator = QuorumEvaluator::new(model, 3, 0.5);
        let result = evaluator
            .evaluate_action("restart_pod", "default/web-1", "", "")
            .await;
        assert!(result.approved);
    }

    #[tokio::test]
    async fn test_malformed_votes_count_as_reject() {
        let model = ScriptedModel::new(&["not json at all", "still not json", "nope"]);
        let evaluator = QuorumEvaluator::new(model, 3, 0.5);
        let result = evaluator
            .evaluate_action("drain_node", "node-1", "", "")
            .await;
        assert!(!result.approved);
        assert!(result.votes.iter().all(|v| !v.approved && v.confidence == 0.0));
    }

    #[tokio::test]
    async fn test_exact_threshold_is_rejected() {
        // 1 of 2 approving is exactly 0.5: not strictly above the threshold.
        let model = ScriptedModel::new(&[
            r#"{"approved": true, "reasoning": "ok", "confidence": 0.9}"#,
            r#"{"approved": false, "reasoning": "no", "confidence": 0.9}"#,
        ]);
        let evaluator = QuorumEvaluator::new(model, 2, 0.5);
        let result = evaluator
            .evaluate_action("scale_deployment", "default/web", "", "")
            .await;
        assert!(!result.approved);
    }

    #[test]
    fn test_parse_vote_json_variants() {
        let direct = parse_vote_json(r#"{"approved": true}"#).unwrap();
        assert_eq!(direct["approved"], true);

        let fenced = parse_vote_json("```json\n{\"approved\": false}\n```").unwrap();
        assert_eq!(fenced["approved"], false);

        let embedded =
            parse_vote_json("Here is my vote: {\"approved\": true, \"confidence\": 1.0} done")
                .unwrap();
        assert_eq!(embedded["confidence"], 1.0);

        assert!(parse_vote_json("no braces here").is_none());
    }
}
