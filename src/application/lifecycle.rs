//! Guardian lifecycle: leaf-first construction, background task start,
//! and teardown with guaranteed task cancellation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::AppState;
use crate::domain::models::config::Config;
use crate::domain::ports::cluster::ClusterApi;
use crate::domain::ports::llm::ChatModel;
use crate::domain::ports::memory::IssueMemory;
use crate::domain::ports::notify::Notifier;
use crate::domain::ports::pipeline::{ClusterAnalyzer, FixPipeline, Forge};
use crate::domain::ports::store::DurableStore;
use crate::domain::ports::telemetry::{LogBackend, MetricsBackend, SecurityBackend, StatusPage};
use crate::infrastructure::config::ConfigStore;
use crate::infrastructure::dev_controller::DevControllerClient;
use crate::infrastructure::gatus::GatusClient;
use crate::infrastructure::github::GithubClient;
use crate::infrastructure::k8sgpt::K8sGptClient;
use crate::infrastructure::kube::KubeApiClient;
use crate::infrastructure::llm::{ChatCompletionsClient, ChatCompletionsConfig};
use crate::infrastructure::loki::LokiClient;
use crate::infrastructure::notify::WebhookNotifier;
use crate::infrastructure::prometheus::PrometheusClient;
use crate::infrastructure::qdrant::QdrantMemory;
use crate::infrastructure::redis_store::RedisStore;
use crate::infrastructure::security::CrowdSecClient;
use crate::services::agent::{tools, AgentOrchestrator, ToolContext, ToolRegistry};
use crate::services::broadcast::{BroadcastHub, BroadcastKind};
use crate::services::checks::CheckContext;
use crate::services::classifier::EscalationClassifier;
use crate::services::correlator::{CorrelatorConfig, IncidentCorrelator};
use crate::services::gateway::ActionGateway;
use crate::services::monitor::ContinuousMonitor;
use crate::services::quorum::QuorumEvaluator;
use crate::services::scanner::ClusterScanner;
use crate::services::self_tuner::SelfTuner;
use crate::services::InvestigateFn;

pub struct Guardian {
    pub state: AppState,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Guardian {
    /// Build the component graph leaf-first with explicit dependency
    /// injection: stores and clients, then policy services, then the
    /// agent, then the monitor wiring that feeds it.
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        // Leaves: durable store, broadcast hub, external clients.
        let store: Arc<dyn DurableStore> =
            Arc::new(RedisStore::connect(&config.redis_url).await);
        let config_store = Arc::new(ConfigStore::new(Arc::clone(&config), Arc::clone(&store)));
        let broadcast = Arc::new(BroadcastHub::default());

        let cluster: Arc<dyn ClusterApi> = Arc::new(
            KubeApiClient::from_config(&config).context("building orchestrator client")?,
        );
        let metrics: Option<Arc<dyn MetricsBackend>> = Some(Arc::new(PrometheusClient::new(
            &config.prometheus_url,
        )));
        let logs: Option<Arc<dyn LogBackend>> =
            Some(Arc::new(LokiClient::new(&config.loki_url)));
        let status_page: Option<Arc<dyn StatusPage>> =
            Some(Arc::new(GatusClient::new(&config.gatus_url)));
        let security: Option<Arc<dyn SecurityBackend>> = Some(Arc::new(CrowdSecClient::new(
            &config.crowdsec_lapi_url,
            config.crowdsec_api_key.clone(),
        )));
        let analyzer: Option<Arc<dyn ClusterAnalyzer>> = if config.k8sgpt_enabled {
            Some(Arc::new(K8sGptClient::new(&config.k8sgpt_url)))
        } else {
            None
        };

        let qdrant = QdrantMemory::new(
            &config.qdrant_url,
            &config.qdrant_collection,
            &config.llm_base_url,
            &config.llm_api_key,
            &config.embedding_model,
        );
        qdrant.connect().await;
        let memory: Arc<dyn IssueMemory> = Arc::new(qdrant);

        let model: Arc<dyn ChatModel> = Arc::new(
            ChatCompletionsClient::new(ChatCompletionsConfig::from_config(&config))
                .context("building LLM client")?,
        );

        let pipeline: Option<Arc<dyn FixPipeline>> = if config.dev_controller_enabled {
            Some(Arc::new(DevControllerClient::new(&config.dev_controller_url)))
        } else {
            None
        };

        let webhook_notifier = WebhookNotifier::from_config(&config);
        let notifier: Option<Arc<dyn Notifier>> = if webhook_notifier.has_channels() {
            Some(Arc::new(webhook_notifier))
        } else {
            warn!("no notification channels configured");
            None
        };
        let forge: Option<Arc<dyn Forge>> =
            GithubClient::from_config(&config).map(|c| Arc::new(c) as Arc<dyn Forge>);

        // Policy services.
        let gateway = Arc::new(ActionGateway::new(
            Arc::clone(&cluster),
            Arc::clone(&store),
            Arc::clone(&config_store),
        ));
        let self_tuner = Arc::new(SelfTuner::new(
            Arc::clone(&store),
            pipeline.clone(),
            Arc::clone(&config_store),
        ));
        let classifier = Arc::new(EscalationClassifier::new(config.escalation_threshold));

        // Agent with its tool surface and quorum gate.
        let quorum = Arc::new(QuorumEvaluator::new(
            Arc::clone(&model),
            config.quorum_agents,
            config.quorum_threshold,
        ));
        let mut registry =
            ToolRegistry::new(Arc::clone(&config_store), Arc::clone(&broadcast))
                .with_quorum(quorum);
        let tool_ctx = ToolContext {
            cluster: Arc::clone(&cluster),
            gateway: Arc::clone(&gateway),
            memory: Arc::clone(&memory),
            metrics: metrics.clone(),
            logs: logs.clone(),
            status_page: status_page.clone(),
            security,
            analyzer: analyzer.clone(),
            notifier,
            forge,
        };
        tools::register_builtin_tools(&mut registry, &tool_ctx);
        info!(tools = registry.len(), "tool registry built");
        let registry = Arc::new(registry);

        let agent = Arc::new(AgentOrchestrator::new(
            Arc::clone(&model),
            registry,
            Arc::clone(&config_store),
            Arc::clone(&broadcast),
            Some(Arc::clone(&self_tuner)),
        ));

        // Monitor, correlator, scanner. Ingress probes hit public hosts,
        // so the probe client keeps default certificate verification.
        let probe_client = reqwest::Client::builder()
            .build()
            .context("building probe client")?;
        let checks = CheckContext {
            cluster: Arc::clone(&cluster),
            metrics: metrics.clone(),
            logs,
            status_page: status_page.clone(),
            http: probe_client,
            pvc_threshold_percent: config.pvc_usage_threshold_percent,
            log_error_threshold: config.log_error_spike_threshold,
        };
        let monitor = Arc::new(ContinuousMonitor::new(
            Arc::clone(&cluster),
            checks,
            classifier,
            Some(Arc::clone(&self_tuner)),
            Arc::clone(&config_store),
            Arc::clone(&broadcast),
        ));
        let correlator = Arc::new(IncidentCorrelator::new(CorrelatorConfig {
            window_seconds: config.correlation_window_seconds,
            debounce_seconds: config.correlation_debounce_seconds,
            expiry_seconds: config.correlation_expiry_seconds,
        }));
        let scanner = Arc::new(ClusterScanner::new(
            Arc::clone(&cluster),
            metrics,
            status_page,
            analyzer,
            Arc::clone(&store),
            Arc::clone(&broadcast),
        ));

        // Both signal producers hand off to the agent through one seam.
        let agent_sink = Arc::clone(&agent);
        let investigate: InvestigateFn = Arc::new(move |description, thread_id| {
            let agent = Arc::clone(&agent_sink);
            Box::pin(async move {
                agent.investigate(&description, Some(thread_id)).await;
            })
        });
        correlator.set_investigation_callback(Arc::clone(&investigate));
        monitor.set_investigate_callback(investigate);

        Ok(Self {
            state: AppState {
                config,
                config_store,
                store,
                broadcast,
                monitor,
                correlator,
                gateway,
                agent,
                scanner,
                self_tuner,
                memory,
                started_at: Utc::now(),
            },
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Start the background tasks: monitor loops, periodic scan,
    /// correlator expiry sweep, and interval tuning.
    pub async fn start_background(&self) {
        Arc::clone(&self.state.monitor).start().await;

        let mut tasks = self.tasks.lock().await;

        let scanner = Arc::clone(&self.state.scanner);
        let config_store = Arc::clone(&self.state.config_store);
        let broadcast = Arc::clone(&self.state.broadcast);
        tasks.push(tokio::spawn(async move {
            loop {
                let interval = config_store.get_u64("scan_interval_seconds").await.max(30);
                tokio::time::sleep(Duration::from_secs(interval)).await;
                match scanner.scan().await {
                    Ok(result) => broadcast.publish(
                        BroadcastKind::HealthUpdate,
                        None,
                        serde_json::json!({
                            "healthy": result["healthy"],
                            "issue_count": result["issue_count"],
                        }),
                    ),
                    Err(err) => warn!(error = %err, "periodic scan failed"),
                }
            }
        }));

        let correlator = Arc::clone(&self.state.correlator);
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                correlator.expire_old().await;
            }
        }));

        let tuner = Arc::clone(&self.state.self_tuner);
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(300)).await;
                tuner.tune_intervals().await;
            }
        }));

        info!("background tasks started");
    }

    /// Teardown in reverse order; every background task is cancelled.
    pub async fn shutdown(&self) {
        self.state.monitor.stop().await;
        self.state.correlator.shutdown().await;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("guardian stopped");
    }

    pub fn router(&self) -> axum::Router {
        crate::api::build_router(self.state.clone())
    }
}
