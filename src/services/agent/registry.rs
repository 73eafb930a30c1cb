//! Tool registry for the agent loop.
//!
//! Each tool is a descriptor `{name, schema, handler}`. Destructive tools
//! are additionally gated by the quorum evaluator; the gate wraps the
//! handler at execution time, so the model sees an identical interface
//! either way.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use crate::domain::errors::GuardianResult;
use crate::domain::ports::llm::{ToolCall, ToolSpec};
use crate::infrastructure::config::ConfigStore;
use crate::services::broadcast::{BroadcastHub, BroadcastKind};
use crate::services::quorum::QuorumEvaluator;

pub type ToolHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, GuardianResult<String>> + Send + Sync>;

pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub handler: ToolHandler,
    pub destructive: bool,
}

impl ToolDescriptor {
    pub fn new(
        name: &str,
        description: &str,
        parameters: serde_json::Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            handler,
            destructive: false,
        }
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
    order: Vec<String>,
    quorum: Option<Arc<QuorumEvaluator>>,
    config: Arc<ConfigStore>,
    broadcast: Arc<BroadcastHub>,
}

impl ToolRegistry {
    pub fn new(config: Arc<ConfigStore>, broadcast: Arc<BroadcastHub>) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            quorum: None,
            config,
            broadcast,
        }
    }

    /// Attach the quorum evaluator gating destructive tools.
    pub fn with_quorum(mut self, quorum: Arc<QuorumEvaluator>) -> Self {
        self.quorum = Some(quorum);
        self
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        if self.tools.contains_key(&descriptor.name) {
            warn!(tool = %descriptor.name, "tool re-registered, replacing");
        } else {
            self.order.push(descriptor.name.clone());
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    /// Tool specs in registration order, as handed to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(ToolDescriptor::spec)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn is_destructive(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.destructive)
    }

    /// Execute a tool call. Errors become text the model can read; a
    /// quorum rejection returns the `BLOCKED by quorum` result without
    /// executing the handler.
    pub async fn execute(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.get(&call.name) else {
            return format!("Error: unknown tool '{}'", call.name);
        };

        if tool.destructive && self.config.get_bool("quorum_enabled").await {
            if let Some(quorum) = &self.quorum {
                let target = extract_target(&call.arguments);
                let context = build_context(&call.arguments);
                let result = quorum
                    .evaluate_action(&call.name, &target, &context, "")
                    .await;

                self.broadcast.publish(
                    BroadcastKind::QuorumVote,
                    None,
                    serde_json::json!({
                        "action": call.name,
                        "target": target,
                        "approved": result.approved,
                        "consensus_ratio": result.consensus_ratio,
                        "votes": result.votes,
                    }),
                );

                if !result.approved {
                    return result.blocked_message();
                }
            }
        }

        match (tool.handler)(call.arguments.clone()).await {
            Ok(output) => output,
            Err(err) => format!("Error: {err}"),
        }
    }
}

/// Build a target identifier from tool arguments.
fn extract_target(args: &serde_json::Value) -> String {
    let get = |key: &str| {
        args.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };
    let namespace = get("namespace");
    let name = get("name")
        .or_else(|| get("pod"))
        .or_else(|| get("deployment"))
        .or_else(|| get("node"))
        .or_else(|| get("job"));
    match (namespace, name) {
        (Some(ns), Some(name)) => format!("{ns}/{name}"),
        (None, Some(name)) => name,
        (Some(ns), None) => ns,
        (None, None) => "unknown".to_string(),
    }
}

/// Build a context string from tool arguments.
fn build_context(args: &serde_json::Value) -> String {
    let mut parts = Vec::new();
    if let Some(reason) = args.get("reason").and_then(|v| v.as_str()) {
        parts.push(format!("Reason: {reason}"));
    }
    if let Some(namespace) = args.get("namespace").and_then(|v| v.as_str()) {
        parts.push(format!("Namespace: {namespace}"));
    }
    if let Some(replicas) = args.get("replicas") {
        parts.push(format!("Target replicas: {replicas}"));
    }
    if parts.is_empty() {
        "No additional context".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::Config;
    use crate::domain::ports::store::NullStore;

    fn registry() -> ToolRegistry {
        let config = Arc::new(ConfigStore::new(
            Arc::new(Config::default()),
            Arc::new(NullStore),
        ));
        ToolRegistry::new(config, Arc::new(BroadcastHub::default()))
    }

    fn echo_tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            "echo arguments back",
            serde_json::json!({"type": "object", "properties": {}}),
            Arc::new(|args| Box::pin(async move { Ok(args.to_string()) })),
        )
    }

    #[tokio::test]
    async fn test_execute_known_tool() {
        let mut registry = registry();
        registry.register(echo_tool("echo"));
        let output = registry
            .execute(&ToolCall {
                id: "1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"a": 1}),
            })
            .await;
        assert_eq!(output, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_text_error() {
        let registry = registry();
        let output = registry
            .execute(&ToolCall {
                id: "1".into(),
                name: "nope".into(),
                arguments: serde_json::json!({}),
            })
            .await;
        assert!(output.starts_with("Error: unknown tool"));
    }

    #[test]
    fn test_specs_preserve_registration_order() {
        let mut registry = registry();
        registry.register(echo_tool("b_tool"));
        registry.register(echo_tool("a_tool"));
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[test]
    fn test_extract_target() {
        assert_eq!(
            extract_target(&serde_json::json!({"namespace": "default", "name": "web-1"})),
            "default/web-1"
        );
        assert_eq!(extract_target(&serde_json::json!({"node": "node-1"})), "node-1");
        assert_eq!(extract_target(&serde_json::json!({})), "unknown");
    }
}
