//! Agent loop behavior: broadcast lifecycle, tool dispatch, quorum gating,
//! and the iteration bound.

mod common;

use std::sync::Arc;

use guardian::domain::models::config::Config;
use guardian::domain::models::InvestigationStatus;
use guardian::domain::ports::llm::{ChatResponse, ToolCall};
use guardian::infrastructure::config::ConfigStore;
use guardian::services::agent::{tools, AgentOrchestrator, ToolContext, ToolRegistry};
use guardian::services::broadcast::{BroadcastHub, BroadcastKind};
use guardian::services::gateway::ActionGateway;
use guardian::services::quorum::QuorumEvaluator;

use common::{MemStore, MockCluster, ScriptedModel};

struct Harness {
    agent: Arc<AgentOrchestrator>,
    broadcast: Arc<BroadcastHub>,
    cluster: Arc<MockCluster>,
}

fn build_harness(config: Config, model: Arc<ScriptedModel>, quorum: Option<Arc<ScriptedModel>>) -> Harness {
    let config = Arc::new(config);
    let cluster = Arc::new(MockCluster::default());
    let store = Arc::new(MemStore::default());
    let config_store = Arc::new(ConfigStore::new(config.clone(), store.clone()));
    let broadcast = Arc::new(BroadcastHub::new(256));

    let gateway = Arc::new(ActionGateway::new(
        cluster.clone(),
        store,
        config_store.clone(),
    ));

    let mut registry = ToolRegistry::new(config_store.clone(), broadcast.clone());
    if let Some(quorum_model) = quorum {
        registry = registry.with_quorum(Arc::new(QuorumEvaluator::new(
            quorum_model,
            config.quorum_agents,
            config.quorum_threshold,
        )));
    }
    let ctx = ToolContext {
        cluster: cluster.clone(),
        gateway,
        memory: Arc::new(guardian::domain::ports::memory::NullMemory),
        metrics: None,
        logs: None,
        status_page: None,
        security: None,
        analyzer: None,
        notifier: None,
        forge: None,
    };
    tools::register_builtin_tools(&mut registry, &ctx);

    let agent = Arc::new(AgentOrchestrator::new(
        model,
        Arc::new(registry),
        config_store,
        broadcast.clone(),
        None,
    ));
    Harness {
        agent,
        broadcast,
        cluster,
    }
}

fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
    }
}

/// One investigation produces, in order, `investigation_started` then
/// `investigation_completed`, sharing the response's id.
#[tokio::test]
async fn test_broadcast_lifecycle_shares_investigation_id() {
    let model = ScriptedModel::new(vec![ScriptedModel::text("Nothing to remediate.")]);
    let harness = build_harness(Config::default(), model, None);
    let mut events = harness.broadcast.subscribe();

    let investigation = harness.agent.investigate("check the cluster", None).await;
    assert_eq!(investigation.status, InvestigationStatus::Completed);
    assert_eq!(investigation.summary, "Nothing to remediate.");

    let started = events.recv().await.unwrap();
    assert_eq!(started.kind, BroadcastKind::InvestigationStarted);
    let completed = loop {
        let message = events.recv().await.unwrap();
        if message.kind == BroadcastKind::InvestigationCompleted {
            break message;
        }
    };
    let expected = Some(investigation.id.to_string());
    assert_eq!(started.investigation_id, expected);
    assert_eq!(completed.investigation_id, expected);
    assert_eq!(completed.data["status"], "completed");
    assert!(completed.data["duration_seconds"].as_f64().unwrap() >= 0.0);
}

/// Tool results feed back into the conversation and steps are recorded.
#[tokio::test]
async fn test_tool_round_trip_records_steps_and_actions() {
    let config = Config {
        require_approval_for: Vec::new(),
        ..Default::default()
    };
    let model = ScriptedModel::new(vec![
        tool_call("c1", "list_pods", serde_json::json!({"namespace": "default"})),
        tool_call(
            "c2",
            "restart_pod",
            serde_json::json!({"namespace": "default", "name": "web-1", "reason": "crashloop"}),
        ),
        ScriptedModel::text("Restarted default/web-1; pod is healthy again."),
    ]);
    let harness = build_harness(config, model, None);

    let investigation = harness
        .agent
        .investigate("pod default/web-1 is crash looping", None)
        .await;

    assert_eq!(investigation.status, InvestigationStatus::Completed);
    assert!(investigation.summary.contains("web-1"));
    assert_eq!(investigation.actions_taken.len(), 1);
    assert!(investigation.actions_taken[0].starts_with("restart_pod"));
    assert!(investigation.steps.iter().any(|s| s.node == "tools"));
    assert_eq!(harness.cluster.calls(), vec!["delete_pod default/web-1"]);
}

/// Quorum rejection: with two of three voters against, a gated tool
/// returns BLOCKED and never reaches the orchestrator.
#[tokio::test]
async fn test_quorum_rejection_blocks_gated_tool() {
    let config = Config {
        require_approval_for: Vec::new(),
        quorum_enabled: true,
        quorum_agents: 3,
        quorum_threshold: 0.5,
        ..Default::default()
    };
    let agent_model = ScriptedModel::new(vec![
        tool_call(
            "c1",
            "restart_pod",
            serde_json::json!({"namespace": "default", "name": "web-1", "reason": "test"}),
        ),
        ScriptedModel::text("The restart was blocked by quorum; gathering more evidence."),
    ]);
    let quorum_model = ScriptedModel::new(vec![
        ScriptedModel::text(r#"{"approved": true, "reasoning": "fine", "confidence": 0.8}"#),
        ScriptedModel::text(r#"{"approved": false, "reasoning": "too risky", "confidence": 0.9}"#),
        ScriptedModel::text(r#"{"approved": false, "reasoning": "not root cause", "confidence": 0.7}"#),
    ]);
    let harness = build_harness(config, agent_model, Some(quorum_model));
    let mut events = harness.broadcast.subscribe();

    let investigation = harness
        .agent
        .investigate("restart default/web-1", None)
        .await;

    assert!(harness.cluster.calls().is_empty(), "blocked tool must not execute");
    assert!(
        investigation.actions_taken.is_empty(),
        "blocked actions are not counted as taken"
    );
    let blocked_step = investigation
        .steps
        .iter()
        .find(|s| s.summary.contains("BLOCKED by quorum"))
        .expect("the blocked result is visible as a step");
    assert!(blocked_step.summary.starts_with("restart_pod"));

    // A quorum_vote broadcast precedes the block.
    let vote = loop {
        let message = events.recv().await.unwrap();
        if message.kind == BroadcastKind::QuorumVote {
            break message;
        }
    };
    assert_eq!(vote.data["approved"], false);
    assert_eq!(vote.data["action"], "restart_pod");
}

/// The loop closes with a forced summary once the iteration bound is hit.
#[tokio::test]
async fn test_iteration_bound_forces_summary() {
    let config = Config {
        require_approval_for: Vec::new(),
        max_agent_iterations: 3,
        ..Default::default()
    };
    // The model keeps asking for tools; the penultimate turn must be
    // forced to text.
    let model = ScriptedModel::new(vec![
        tool_call("c1", "list_pods", serde_json::json!({})),
        tool_call("c2", "list_pods", serde_json::json!({})),
        ScriptedModel::text("Out of budget: pods look stable overall."),
    ]);
    let harness = build_harness(config, model.clone(), None);

    let investigation = harness.agent.investigate("look around", None).await;
    assert_eq!(investigation.status, InvestigationStatus::Completed);
    assert_eq!(investigation.summary, "Out of budget: pods look stable overall.");

    // The closing request contains the summarize instruction and no tools.
    let requests = model.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert!(last
        .iter()
        .any(|m| m.content.contains("Summarize your findings")));
}

/// An LLM failure terminates the run as failed with the error preserved.
#[tokio::test]
async fn test_model_error_fails_investigation() {
    struct FailingModel;

    #[async_trait::async_trait]
    impl guardian::domain::ports::llm::ChatModel for FailingModel {
        async fn chat(
            &self,
            _messages: &[guardian::domain::ports::llm::ChatMessage],
            _tools: &[guardian::domain::ports::llm::ToolSpec],
        ) -> guardian::domain::errors::GuardianResult<ChatResponse> {
            Err(guardian::domain::errors::GuardianError::Llm(
                "backend unreachable".to_string(),
            ))
        }
    }

    let config = Arc::new(Config::default());
    let store = Arc::new(MemStore::default());
    let config_store = Arc::new(ConfigStore::new(config, store));
    let broadcast = Arc::new(BroadcastHub::new(64));
    let registry = Arc::new(ToolRegistry::new(config_store.clone(), broadcast.clone()));
    let agent = AgentOrchestrator::new(
        Arc::new(FailingModel),
        registry,
        config_store,
        broadcast,
        None,
    );

    let investigation = agent.investigate("anything", None).await;
    assert_eq!(investigation.status, InvestigationStatus::Failed);
    assert!(investigation.error.unwrap().contains("backend unreachable"));
    assert!(!investigation.summary.is_empty());
}
