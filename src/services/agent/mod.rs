//! Agent orchestrator: a bounded tool-using reasoning loop.
//!
//! Two graph nodes, `agent` (inference) and `tools` (dispatch). After
//! `agent`, control moves to `tools` while the reply contains tool calls
//! and the iteration budget allows; on the penultimate iteration the model
//! is invoked without tool bindings and with an explicit summarize turn,
//! forcing a text closure. Any error terminates the run as failed with
//! partial steps preserved.

pub mod prompts;
pub mod registry;
pub mod tools;

pub use registry::{ToolDescriptor, ToolHandler, ToolRegistry};
pub use tools::ToolContext;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::domain::models::investigation::{
    Investigation, InvestigationStatus, InvestigationStep,
};
use crate::domain::ports::llm::{ChatMessage, ChatModel};
use crate::infrastructure::config::ConfigStore;
use crate::services::broadcast::{BroadcastHub, BroadcastKind};
use crate::services::quiet_hours;
use crate::services::self_tuner::SelfTuner;

/// Truncate tool output for step broadcasts.
fn summarize_output(output: &str) -> String {
    const LIMIT: usize = 400;
    if output.len() <= LIMIT {
        output.to_string()
    } else {
        let mut cut = LIMIT;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... ({} bytes total)", &output[..cut], output.len())
    }
}

/// Pull the `[source]` tags out of a monitor-generated description.
fn extract_sources(description: &str) -> Vec<String> {
    description
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let rest = line.strip_prefix("- [")?;
            let (source, _) = rest.split_once(']')?;
            Some(source.to_string())
        })
        .collect()
}

pub struct AgentOrchestrator {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    config: Arc<ConfigStore>,
    broadcast: Arc<BroadcastHub>,
    self_tuner: Option<Arc<SelfTuner>>,
    investigations: RwLock<HashMap<String, Investigation>>,
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        config: Arc<ConfigStore>,
        broadcast: Arc<BroadcastHub>,
        self_tuner: Option<Arc<SelfTuner>>,
    ) -> Self {
        Self {
            model,
            registry,
            config,
            broadcast,
            self_tuner,
            investigations: RwLock::new(HashMap::new()),
        }
    }

    /// Run one investigation to a terminal state. Concurrent runs are
    /// distinguished by thread id; each run is linear internally.
    pub async fn investigate(
        &self,
        description: &str,
        thread_id: Option<String>,
    ) -> Investigation {
        let thread_id = thread_id
            .unwrap_or_else(|| format!("api-{}", uuid::Uuid::new_v4().simple()));
        let mut investigation = Investigation::start(description, thread_id.clone());
        let investigation_id = investigation.id.to_string();

        info!(investigation_id = %investigation_id, thread_id = %thread_id, "investigation started");
        self.broadcast.publish(
            BroadcastKind::InvestigationStarted,
            Some(investigation_id.clone()),
            serde_json::json!({
                "description": description,
                "thread_id": thread_id,
            }),
        );

        let quiet = self.in_quiet_hours().await;
        let result = self.run_loop(&mut investigation, quiet).await;

        match result {
            Ok(summary) => investigation.complete(summary),
            Err(err) => {
                error!(investigation_id = %investigation_id, error = %err, "investigation failed");
                investigation.fail(err.to_string());
            }
        }

        // Feed check feedback to the self-tuner: an investigation that
        // completed without any action is a likely false positive for the
        // checks that raised it.
        if let Some(tuner) = &self.self_tuner {
            if investigation.status == InvestigationStatus::Completed {
                let false_positive = investigation.actions_taken.is_empty();
                for source in extract_sources(&investigation.description) {
                    tuner.record_check_feedback(&source, false_positive);
                }
            }
        }

        self.broadcast.publish(
            BroadcastKind::InvestigationCompleted,
            Some(investigation_id.clone()),
            serde_json::json!({
                "status": investigation.status.as_str(),
                "summary": investigation.summary,
                "error": investigation.error,
                "duration_seconds": investigation.duration_seconds,
                "actions_taken": investigation.actions_taken,
            }),
        );

        self.investigations
            .write()
            .await
            .insert(investigation_id, investigation.clone());
        investigation
    }

    async fn in_quiet_hours(&self) -> bool {
        let start = self
            .config
            .get("quiet_hours_start")
            .await
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string));
        let end = self
            .config
            .get("quiet_hours_end")
            .await
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string));
        let tz = self
            .config
            .get("quiet_hours_tz")
            .await
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_else(|| "UTC".to_string());
        quiet_hours::is_quiet_hours(start.as_deref(), end.as_deref(), &tz)
    }

    async fn run_loop(
        &self,
        investigation: &mut Investigation,
        quiet: bool,
    ) -> crate::domain::errors::GuardianResult<String> {
        let investigation_id = investigation.id.to_string();
        let max_iterations = (self.config.get_u64("max_agent_iterations").await as usize).max(2);

        let mut messages = vec![
            ChatMessage::system(prompts::build_system_prompt(quiet)),
            ChatMessage::user(investigation.description.clone()),
        ];

        for iteration in 0..max_iterations {
            let closing = iteration + 1 >= max_iterations;
            let tools = if closing {
                Vec::new()
            } else {
                self.registry.specs()
            };
            if closing {
                messages.push(ChatMessage::user(prompts::SUMMARIZE_PROMPT));
            }

            let response = self.model.chat(&messages, &tools).await?;

            if !response.has_tool_calls() || closing {
                self.step(
                    investigation,
                    &investigation_id,
                    "agent",
                    summarize_output(&response.content),
                );
                return Ok(response.content);
            }

            if !response.content.is_empty() {
                self.step(
                    investigation,
                    &investigation_id,
                    "agent",
                    summarize_output(&response.content),
                );
            }
            messages.push(ChatMessage::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let output = self.registry.execute(call).await;
                if self.registry.is_destructive(&call.name)
                    && !output.starts_with("BLOCKED")
                {
                    investigation
                        .actions_taken
                        .push(format!("{}({})", call.name, call.arguments));
                }
                self.step(
                    investigation,
                    &investigation_id,
                    "tools",
                    format!("{} -> {}", call.name, summarize_output(&output)),
                );
                messages.push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }

        // Unreachable in practice: the closing iteration always returns.
        Ok(String::new())
    }

    fn step(
        &self,
        investigation: &mut Investigation,
        investigation_id: &str,
        node: &str,
        summary: String,
    ) {
        self.broadcast.publish(
            BroadcastKind::InvestigationStep,
            Some(investigation_id.to_string()),
            serde_json::json!({"node": node, "summary": summary}),
        );
        investigation.add_step(InvestigationStep::new(node, summary));
    }

    pub async fn get(&self, investigation_id: &str) -> Option<Investigation> {
        self.investigations.read().await.get(investigation_id).cloned()
    }

    pub async fn list(&self) -> Vec<Investigation> {
        let mut all: Vec<Investigation> =
            self.investigations.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_output_truncates() {
        let long = "x".repeat(1000);
        let summary = summarize_output(&long);
        assert!(summary.len() < 500);
        assert!(summary.contains("1000 bytes total"));
        assert_eq!(summarize_output("short"), "short");
    }

    #[test]
    fn test_extract_sources() {
        let description = "Continuous monitor detected anomalies for default/web:\n\
                           - [k8s_crashloop] CrashLoopBackOff: default/web: 7 restarts\n\
                           - [prometheus] Alert firing: KubePodCrashLooping: looping";
        assert_eq!(extract_sources(description), vec!["k8s_crashloop", "prometheus"]);
        assert!(extract_sources("a user request, no tags").is_empty());
    }
}
