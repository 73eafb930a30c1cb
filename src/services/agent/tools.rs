//! Builtin tool surface for the investigation agent.
//!
//! Read-only cluster queries, metric/log/security queries, the gated
//! mutations (which all go through the action gateway), escalation helpers
//! (PR, notification, ticket), and vector-memory recall/store. Tools whose
//! backend is not configured are simply not registered, so the model never
//! sees a tool it cannot use.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::models::signal::Severity;
use crate::domain::ports::cluster::ClusterApi;
use crate::domain::ports::memory::IssueMemory;
use crate::domain::ports::notify::Notifier;
use crate::domain::ports::pipeline::{ClusterAnalyzer, Forge};
use crate::domain::ports::telemetry::{LogBackend, MetricsBackend, SecurityBackend, StatusPage};
use crate::services::gateway::ActionGateway;
use crate::services::playbooks;

use super::registry::{ToolDescriptor, ToolRegistry};

/// Collaborators the builtin tools close over.
#[derive(Clone)]
pub struct ToolContext {
    pub cluster: Arc<dyn ClusterApi>,
    pub gateway: Arc<ActionGateway>,
    pub memory: Arc<dyn IssueMemory>,
    pub metrics: Option<Arc<dyn MetricsBackend>>,
    pub logs: Option<Arc<dyn LogBackend>>,
    pub status_page: Option<Arc<dyn StatusPage>>,
    pub security: Option<Arc<dyn SecurityBackend>>,
    pub analyzer: Option<Arc<dyn ClusterAnalyzer>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub forge: Option<Arc<dyn Forge>>,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn req_str(args: &Value, key: &str) -> GuardianResult<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| GuardianError::Other(format!("missing required argument '{key}'")))
}

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn opt_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn render<T: serde::Serialize>(value: &T) -> GuardianResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Register every builtin tool available with the given collaborators.
#[allow(clippy::too_many_lines)]
pub fn register_builtin_tools(registry: &mut ToolRegistry, ctx: &ToolContext) {
    register_cluster_reads(registry, ctx);
    register_metric_tools(registry, ctx);
    register_log_tools(registry, ctx);
    register_security_tools(registry, ctx);
    register_mutations(registry, ctx);
    register_escalation_tools(registry, ctx);
    register_memory_tools(registry, ctx);

    registry.register(ToolDescriptor::new(
        "find_playbook",
        "Find a remediation playbook matching the issue and render its steps. \
         Provide issue_type plus any of namespace, pod, deployment, job, node.",
        schema(
            json!({
                "issue_type": {"type": "string", "description": "Short issue label, e.g. 'crashloop', 'oom', 'rollout'"},
                "namespace": {"type": "string"},
                "pod": {"type": "string"},
                "deployment": {"type": "string"},
                "job": {"type": "string"},
                "node": {"type": "string"},
            }),
            &["issue_type"],
        ),
        Arc::new(move |args| {
            Box::pin(async move {
                let mut data: HashMap<String, String> = HashMap::new();
                for key in ["issue_type", "namespace", "pod", "deployment", "job", "node"] {
                    if let Some(value) = opt_str(&args, key) {
                        data.insert(key.to_string(), value);
                    }
                }
                match playbooks::find_matching(&data) {
                    Some(playbook) => Ok(playbook.render_prompt(&data)),
                    None => Ok("No playbook matches this issue.".to_string()),
                }
            })
        }),
    ));
}

fn register_cluster_reads(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_pods",
        "List pods with phase, readiness, and restart counts, optionally filtered by namespace.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.list_pods(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "describe_pod",
        "Describe one pod: phase, node, restarts, readiness, owners.",
        schema(
            json!({"namespace": {"type": "string"}, "name": {"type": "string"}}),
            &["namespace", "name"],
        ),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let name = req_str(&args, "name")?;
                render(&cluster.get_pod(&namespace, &name).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_nodes",
        "List nodes with their conditions and schedulability.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let _ = args;
                render(&cluster.list_nodes().await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "describe_node",
        "Describe one node, including Ready and pressure conditions.",
        schema(json!({"name": {"type": "string"}}), &["name"]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let name = req_str(&args, "name")?;
                let nodes = cluster.list_nodes().await?;
                match nodes.into_iter().find(|n| n.name == name) {
                    Some(node) => render(&node),
                    None => Ok(format!("Node {name} not found")),
                }
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_deployments",
        "List deployments with desired/available replicas and rollout state.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.list_deployments(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "describe_deployment",
        "Describe one deployment's replica and rollout status.",
        schema(
            json!({"namespace": {"type": "string"}, "name": {"type": "string"}}),
            &["namespace", "name"],
        ),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let name = req_str(&args, "name")?;
                render(&cluster.get_deployment(&namespace, &name).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_statefulsets",
        "List statefulsets with replica status.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.list_statefulsets(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_daemonsets",
        "List daemon sets with desired/ready/unavailable counts.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let _ = args;
                render(&cluster.list_daemonsets().await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_failed_jobs",
        "List jobs with failed pods.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let _ = args;
                render(&cluster.list_failed_jobs().await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_hpas",
        "List horizontal pod autoscalers and their current/target metrics.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.list_hpas(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_pdbs",
        "List pod disruption budgets and their allowed disruptions.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.list_pdbs(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_services",
        "List services with their endpoints readiness.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.list_services(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "list_ingress_routes",
        "List ingress routes with their hosts.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let _ = args;
                render(&cluster.list_ingress_routes().await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "get_recent_events",
        "Recent cluster events (Warning and Normal), optionally per namespace.",
        schema(json!({"namespace": {"type": "string"}}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = opt_str(&args, "namespace");
                render(&cluster.recent_events(namespace.as_deref()).await?)
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "get_pod_logs",
        "Tail a pod's live logs from the orchestrator.",
        schema(
            json!({
                "namespace": {"type": "string"},
                "name": {"type": "string"},
                "container": {"type": "string"},
                "tail_lines": {"type": "integer", "description": "Default 100"},
            }),
            &["namespace", "name"],
        ),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let name = req_str(&args, "name")?;
                let container = opt_str(&args, "container");
                let tail = opt_u64(&args, "tail_lines", 100) as u32;
                cluster
                    .pod_logs(&namespace, &name, container.as_deref(), tail, false)
                    .await
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "get_previous_pod_logs",
        "Logs from a pod's previous (crashed) container instance, for post-mortem analysis.",
        schema(
            json!({
                "namespace": {"type": "string"},
                "name": {"type": "string"},
                "container": {"type": "string"},
                "tail_lines": {"type": "integer", "description": "Default 100"},
            }),
            &["namespace", "name"],
        ),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let name = req_str(&args, "name")?;
                let container = opt_str(&args, "container");
                let tail = opt_u64(&args, "tail_lines", 100) as u32;
                cluster
                    .pod_logs(&namespace, &name, container.as_deref(), tail, true)
                    .await
            })
        }),
    ));

    let cluster = Arc::clone(&ctx.cluster);
    registry.register(ToolDescriptor::new(
        "get_certificate_status",
        "TLS certificate health: readiness and days until expiry.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let cluster = Arc::clone(&cluster);
            Box::pin(async move {
                let _ = args;
                render(&cluster.list_certificates().await?)
            })
        }),
    ));
}

fn register_metric_tools(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let Some(metrics) = &ctx.metrics else { return };

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "query_prometheus",
        "Run a raw PromQL instant query.",
        schema(json!({"query": {"type": "string"}}), &["query"]),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let query = req_str(&args, "query")?;
                render(&backend.query(&query).await?)
            })
        }),
    ));

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "get_pod_cpu",
        "A pod's CPU usage versus its request and limit.",
        schema(
            json!({"namespace": {"type": "string"}, "pod": {"type": "string"}}),
            &["namespace", "pod"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let pod = req_str(&args, "pod")?;
                render(&backend.pod_cpu(&namespace, &pod).await?)
            })
        }),
    ));

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "get_pod_memory",
        "A pod's memory usage versus its request and limit.",
        schema(
            json!({"namespace": {"type": "string"}, "pod": {"type": "string"}}),
            &["namespace", "pod"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let pod = req_str(&args, "pod")?;
                render(&backend.pod_memory(&namespace, &pod).await?)
            })
        }),
    ));

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "get_service_error_rate",
        "HTTP 5xx error rate for a service over a window (default 5m).",
        schema(
            json!({
                "namespace": {"type": "string"},
                "service": {"type": "string"},
                "window": {"type": "string", "description": "PromQL range, e.g. '5m'"},
            }),
            &["namespace", "service"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let service = req_str(&args, "service")?;
                let window = opt_str(&args, "window").unwrap_or_else(|| "5m".to_string());
                let rate = backend
                    .service_error_rate(&namespace, &service, &window)
                    .await?;
                Ok(format!("error_rate={rate:.4} over {window}"))
            })
        }),
    ));

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "get_request_latency",
        "Request latency quantiles (p50/p95/p99) for a service.",
        schema(
            json!({
                "namespace": {"type": "string"},
                "service": {"type": "string"},
                "window": {"type": "string", "description": "PromQL range, e.g. '5m'"},
            }),
            &["namespace", "service"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let service = req_str(&args, "service")?;
                let window = opt_str(&args, "window").unwrap_or_else(|| "5m".to_string());
                render(&backend.request_latency(&namespace, &service, &window).await?)
            })
        }),
    ));

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "get_firing_alerts",
        "Alerts currently firing in the metrics backend.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let _ = args;
                render(&backend.firing_alerts().await?)
            })
        }),
    ));

    let backend = Arc::clone(metrics);
    registry.register(ToolDescriptor::new(
        "get_volume_usage",
        "Persistent volume claim usage percentages across the cluster.",
        schema(json!({}), &[]),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let _ = args;
                render(&backend.volume_usage().await?)
            })
        }),
    ));
}

fn register_log_tools(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let Some(logs) = &ctx.logs else { return };

    let backend = Arc::clone(logs);
    registry.register(ToolDescriptor::new(
        "get_pod_log_history",
        "Aggregated log history for a pod from the log backend (survives restarts).",
        schema(
            json!({
                "namespace": {"type": "string"},
                "pod": {"type": "string"},
                "since": {"type": "string", "description": "Lookback, e.g. '1h'"},
                "limit": {"type": "integer"},
            }),
            &["namespace", "pod"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let pod = req_str(&args, "pod")?;
                let since = opt_str(&args, "since").unwrap_or_else(|| "1h".to_string());
                let limit = opt_u64(&args, "limit", 100) as u32;
                backend.pod_logs(&namespace, &pod, &since, limit).await
            })
        }),
    ));

    let backend = Arc::clone(logs);
    registry.register(ToolDescriptor::new(
        "get_namespace_errors",
        "Error-level log lines across a namespace.",
        schema(
            json!({
                "namespace": {"type": "string"},
                "since": {"type": "string", "description": "Lookback, e.g. '1h'"},
                "limit": {"type": "integer"},
            }),
            &["namespace"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let namespace = req_str(&args, "namespace")?;
                let since = opt_str(&args, "since").unwrap_or_else(|| "1h".to_string());
                let limit = opt_u64(&args, "limit", 100) as u32;
                backend.namespace_errors(&namespace, &since, limit).await
            })
        }),
    ));

    let backend = Arc::clone(logs);
    registry.register(ToolDescriptor::new(
        "search_logs",
        "Free-text search across all logs.",
        schema(
            json!({
                "query": {"type": "string"},
                "since": {"type": "string", "description": "Lookback, e.g. '1h'"},
                "limit": {"type": "integer"},
            }),
            &["query"],
        ),
        Arc::new(move |args| {
            let backend = Arc::clone(&backend);
            Box::pin(async move {
                let query = req_str(&args, "query")?;
                let since = opt_str(&args, "since").unwrap_or_else(|| "1h".to_string());
                let limit = opt_u64(&args, "limit", 100) as u32;
                backend.search(&query, &since, limit).await
            })
        }),
    ));
}

fn register_security_tools(registry: &mut ToolRegistry, ctx: &ToolContext) {
    if let Some(security) = &ctx.security {
        let backend = Arc::clone(security);
        registry.register(ToolDescriptor::new(
            "get_ban_decisions",
            "Active ban decisions from the runtime-security backend.",
            schema(json!({}), &[]),
            Arc::new(move |args| {
                let backend = Arc::clone(&backend);
                Box::pin(async move {
                    let _ = args;
                    render(&backend.ban_decisions().await?)
                })
            }),
        ));

        let backend = Arc::clone(security);
        registry.register(ToolDescriptor::new(
            "get_security_alerts",
            "Recent security alerts (scenario, source, event counts).",
            schema(json!({"limit": {"type": "integer"}}), &[]),
            Arc::new(move |args| {
                let backend = Arc::clone(&backend);
                Box::pin(async move {
                    let limit = opt_u64(&args, "limit", 25) as usize;
                    render(&backend.recent_alerts(limit).await?)
                })
            }),
        ));
    }

    if let Some(analyzer) = &ctx.analyzer {
        let analyzer = Arc::clone(analyzer);
        registry.register(ToolDescriptor::new(
            "analyze_cluster",
            "Run the cluster-analysis helper and return the issues it finds.",
            schema(json!({}), &[]),
            Arc::new(move |args| {
                let analyzer = Arc::clone(&analyzer);
                Box::pin(async move {
                    let _ = args;
                    render(&analyzer.issues().await?)
                })
            }),
        ));
    }

    if let Some(status_page) = &ctx.status_page {
        let status_page = Arc::clone(status_page);
        registry.register(ToolDescriptor::new(
            "get_status_page",
            "Endpoint health from the external status page.",
            schema(json!({}), &[]),
            Arc::new(move |args| {
                let status_page = Arc::clone(&status_page);
                Box::pin(async move {
                    let _ = args;
                    render(&status_page.endpoint_statuses().await?)
                })
            }),
        ));
    }
}

fn register_mutations(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let mutation_schema = |extra: Value, required: &[&str]| {
        let mut properties = json!({
            "namespace": {"type": "string"},
            "name": {"type": "string"},
            "reason": {"type": "string", "description": "Why this action is needed; recorded in the audit log"},
        });
        if let (Some(base), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        schema(properties, required)
    };

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "restart_pod",
            "Delete a pod so its controller recreates it. Use for stuck or crash-looping pods.",
            mutation_schema(json!({}), &["namespace", "name", "reason"]),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let namespace = req_str(&args, "namespace")?;
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway.restart_pod(&namespace, &name, &reason).await.to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "rollout_restart_deployment",
            "Trigger a rolling restart of a deployment.",
            mutation_schema(json!({}), &["namespace", "name", "reason"]),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let namespace = req_str(&args, "namespace")?;
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway
                        .rollout_restart_deployment(&namespace, &name, &reason)
                        .await
                        .to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "rollout_restart_statefulset",
            "Trigger a rolling restart of a statefulset.",
            mutation_schema(json!({}), &["namespace", "name", "reason"]),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let namespace = req_str(&args, "namespace")?;
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway
                        .rollout_restart_statefulset(&namespace, &name, &reason)
                        .await
                        .to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "scale_deployment",
            "Scale a deployment to a replica count. Scaling to zero requires human approval.",
            mutation_schema(
                json!({"replicas": {"type": "integer"}}),
                &["namespace", "name", "replicas", "reason"],
            ),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let namespace = req_str(&args, "namespace")?;
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    let replicas = args
                        .get("replicas")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| {
                            GuardianError::Other("missing required argument 'replicas'".into())
                        })? as i32;
                    Ok(gateway
                        .scale_deployment(&namespace, &name, replicas, &reason)
                        .await
                        .to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "rollback_deployment",
            "Roll a deployment back to its previous revision.",
            mutation_schema(json!({}), &["namespace", "name", "reason"]),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let namespace = req_str(&args, "namespace")?;
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway
                        .rollback_deployment(&namespace, &name, &reason)
                        .await
                        .to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "delete_failed_job",
            "Delete a failed job and its pods.",
            mutation_schema(json!({}), &["namespace", "name", "reason"]),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let namespace = req_str(&args, "namespace")?;
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway
                        .delete_failed_job(&namespace, &name, &reason)
                        .await
                        .to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "cordon_node",
            "Mark a node unschedulable.",
            schema(
                json!({"name": {"type": "string"}, "reason": {"type": "string"}}),
                &["name", "reason"],
            ),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway.cordon_node(&name, &reason).await.to_tool_result())
                })
            }),
        )
        .destructive(),
    );

    let gateway = Arc::clone(&ctx.gateway);
    registry.register(
        ToolDescriptor::new(
            "drain_node",
            "Cordon a node and evict its pods (protected namespaces and daemon sets are skipped).",
            schema(
                json!({"name": {"type": "string"}, "reason": {"type": "string"}}),
                &["name", "reason"],
            ),
            Arc::new(move |args| {
                let gateway = Arc::clone(&gateway);
                Box::pin(async move {
                    let name = req_str(&args, "name")?;
                    let reason = req_str(&args, "reason")?;
                    Ok(gateway.drain_node(&name, &reason).await.to_tool_result())
                })
            }),
        )
        .destructive(),
    );
}

fn register_escalation_tools(registry: &mut ToolRegistry, ctx: &ToolContext) {
    if let Some(forge) = &ctx.forge {
        let forge = Arc::clone(forge);
        registry.register(ToolDescriptor::new(
            "create_pull_request",
            "Open a pull request with a proposed infrastructure fix (single file change).",
            schema(
                json!({
                    "title": {"type": "string"},
                    "body": {"type": "string"},
                    "branch": {"type": "string"},
                    "file_path": {"type": "string"},
                    "file_content": {"type": "string"},
                }),
                &["title", "body", "branch", "file_path", "file_content"],
            ),
            Arc::new(move |args| {
                let forge = Arc::clone(&forge);
                Box::pin(async move {
                    let title = req_str(&args, "title")?;
                    let body = req_str(&args, "body")?;
                    let branch = req_str(&args, "branch")?;
                    let file_path = req_str(&args, "file_path")?;
                    let file_content = req_str(&args, "file_content")?;
                    let url = forge
                        .create_fix_pr(&title, &body, &branch, &file_path, &file_content)
                        .await?;
                    Ok(format!("Pull request created: {url}"))
                })
            }),
        ));
    }

    if let Some(notifier) = &ctx.notifier {
        let hub = Arc::clone(notifier);
        registry.register(ToolDescriptor::new(
            "send_notification",
            "Notify operators through the configured channels.",
            schema(
                json!({
                    "message": {"type": "string"},
                    "severity": {"type": "string", "enum": ["info", "warning", "critical"]},
                }),
                &["message"],
            ),
            Arc::new(move |args| {
                let hub = Arc::clone(&hub);
                Box::pin(async move {
                    let message = req_str(&args, "message")?;
                    let severity = opt_str(&args, "severity")
                        .and_then(|s| Severity::parse_str(&s))
                        .unwrap_or(Severity::Info);
                    let delivered = hub.notify(&message, severity).await;
                    render(&delivered)
                })
            }),
        ));

        let hub = Arc::clone(notifier);
        registry.register(ToolDescriptor::new(
            "create_ticket",
            "Open a ticket in the configured ticketing system.",
            schema(
                json!({
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "severity": {"type": "string", "enum": ["info", "warning", "critical"]},
                }),
                &["title", "description"],
            ),
            Arc::new(move |args| {
                let hub = Arc::clone(&hub);
                Box::pin(async move {
                    let title = req_str(&args, "title")?;
                    let description = req_str(&args, "description")?;
                    let severity = opt_str(&args, "severity")
                        .and_then(|s| Severity::parse_str(&s))
                        .unwrap_or(Severity::Warning);
                    let ticket_id = hub.create_ticket(&title, &description, severity).await?;
                    Ok(format!("Ticket created: {ticket_id}"))
                })
            }),
        ));
    }
}

fn register_memory_tools(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let memory = Arc::clone(&ctx.memory);
    registry.register(ToolDescriptor::new(
        "recall_similar_issues",
        "Retrieve the most similar past issues and their resolutions. Call this first.",
        schema(
            json!({
                "query": {"type": "string", "description": "Short issue summary"},
                "top_k": {"type": "integer", "description": "Default 5"},
            }),
            &["query"],
        ),
        Arc::new(move |args| {
            let memory = Arc::clone(&memory);
            Box::pin(async move {
                let query = req_str(&args, "query")?;
                let top_k = opt_u64(&args, "top_k", 5) as usize;
                let recalled = memory.recall_similar(&query, top_k).await?;
                if recalled.is_empty() {
                    Ok("No similar past issues found.".to_string())
                } else {
                    render(&recalled)
                }
            })
        }),
    ));

    let memory = Arc::clone(&ctx.memory);
    registry.register(ToolDescriptor::new(
        "store_resolution",
        "Store a resolved issue and what fixed it, for future recall.",
        schema(
            json!({
                "issue": {"type": "string", "description": "Concise issue summary"},
                "resolution": {"type": "string", "description": "What fixed it"},
                "namespace": {"type": "string"},
                "resource": {"type": "string"},
            }),
            &["issue", "resolution"],
        ),
        Arc::new(move |args| {
            let memory = Arc::clone(&memory);
            Box::pin(async move {
                let issue = req_str(&args, "issue")?;
                let resolution = req_str(&args, "resolution")?;
                let metadata = json!({
                    "namespace": opt_str(&args, "namespace"),
                    "resource": opt_str(&args, "resource"),
                });
                memory.store_resolution(&issue, &resolution, metadata).await?;
                Ok("Resolution stored.".to_string())
            })
        }),
    ));
}
