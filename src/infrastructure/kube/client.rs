//! HTTP client against the Kubernetes REST API, implementing `ClusterApi`.
//!
//! Policy (protected namespaces, approvals, rate limits) lives in the
//! action gateway; this adapter only translates between the port types and
//! the wire.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::models::config::Config;
use crate::domain::ports::cluster::{
    CertificateSummary, ClusterApi, CrashLoopPod, DaemonSetSummary, DeploymentSummary,
    EventRecord, IngressRoute, JobSummary, NodeCondition, NodeSummary, OwnerRef, PodSummary,
    ReplicaSetSummary, ServiceSummary, WorkloadScale,
};

use super::types::{
    WatchLine, WireCertificate, WireDaemonSet, WireDeployment, WireEvent, WireIngress, WireJob,
    WireList, WireNode, WirePod, WireReplicaSet, WireService,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";
const IN_CLUSTER_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

pub struct KubeApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    protected_namespaces: Vec<String>,
}

impl KubeApiClient {
    /// Build a client from configuration: explicit token first, then the
    /// in-cluster service-account token file. TLS is always verified,
    /// against `kube_ca_path`, the in-cluster CA bundle, or the system
    /// roots; skipping verification requires the explicit config flag.
    pub fn from_config(config: &Config) -> GuardianResult<Self> {
        let token = match &config.kube_token {
            Some(token) => Some(token.clone()),
            None => std::fs::read_to_string(&config.kube_token_path)
                .ok()
                .map(|t| t.trim().to_string()),
        };

        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if config.kube_insecure_skip_tls_verify {
            warn!("orchestrator API TLS verification disabled by configuration");
            builder = builder.danger_accept_invalid_certs(true);
        } else {
            let ca_path = config.kube_ca_path.clone().or_else(|| {
                std::path::Path::new(IN_CLUSTER_CA_PATH)
                    .exists()
                    .then(|| IN_CLUSTER_CA_PATH.to_string())
            });
            if let Some(ca_path) = ca_path {
                let pem = std::fs::read(&ca_path).map_err(|e| {
                    GuardianError::Config(format!("cannot read CA bundle {ca_path}: {e}"))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| GuardianError::Config(format!("invalid CA bundle: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        let http = builder
            .build()
            .map_err(|e| GuardianError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.kube_api_url.trim_end_matches('/').to_string(),
            token,
            protected_namespaces: config.protected_namespaces.clone(),
        })
    }

    /// Test constructor against an arbitrary API endpoint.
    pub fn with_base_url(base_url: &str, protected_namespaces: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            protected_namespaces,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> GuardianResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(ToString::to_string))
            .unwrap_or(body);
        Err(GuardianError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GuardianResult<T> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_text(&self, path: &str) -> GuardianResult<String> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Ok(Self::check(response).await?.text().await?)
    }

    async fn patch_json(&self, path: &str, body: &serde_json::Value) -> GuardianResult<()> {
        let response = self
            .request(reqwest::Method::PATCH, path)
            .header("content-type", "application/strategic-merge-patch+json")
            .json(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> GuardianResult<()> {
        let response = self.request(reqwest::Method::DELETE, path).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    fn pod_summary(pod: WirePod) -> PodSummary {
        let restart_count = pod
            .status
            .container_statuses
            .iter()
            .map(|c| c.restart_count)
            .max()
            .unwrap_or(0);
        let ready = !pod.status.container_statuses.is_empty()
            && pod.status.container_statuses.iter().all(|c| c.ready);
        PodSummary {
            namespace: pod.metadata.namespace,
            name: pod.metadata.name,
            phase: pod.status.phase.unwrap_or_default(),
            node: pod.spec.node_name,
            restart_count,
            ready,
            owner_refs: pod
                .metadata
                .owner_references
                .into_iter()
                .map(|r| OwnerRef {
                    kind: r.kind,
                    name: r.name,
                })
                .collect(),
        }
    }

    fn deployment_summary(deployment: WireDeployment) -> DeploymentSummary {
        let progressing = deployment
            .status
            .conditions
            .iter()
            .find(|c| c.kind == "Progressing")
            .map(|c| c.status == "True");
        let condition_reason = deployment
            .status
            .conditions
            .iter()
            .find(|c| c.kind == "Progressing")
            .and_then(|c| c.reason.clone())
            .unwrap_or_default();
        DeploymentSummary {
            namespace: deployment.metadata.namespace,
            name: deployment.metadata.name,
            desired: deployment.spec.replicas.unwrap_or(0),
            available: deployment.status.available_replicas.unwrap_or(0),
            ready: deployment.status.ready_replicas.unwrap_or(0),
            progressing,
            condition_reason,
        }
    }

    fn event_record(event: WireEvent) -> EventRecord {
        let (involved_kind, involved_name, event_namespace) = event
            .involved_object
            .map(|o| {
                (
                    o.kind.unwrap_or_default(),
                    o.name.unwrap_or_default(),
                    o.namespace.unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        let namespace = if event.metadata.namespace.is_empty() {
            event_namespace
        } else {
            event.metadata.namespace
        };
        EventRecord {
            namespace,
            kind: event.kind.unwrap_or_default(),
            reason: event.reason.unwrap_or_default(),
            message: event.message.unwrap_or_default(),
            involved_kind,
            involved_name,
            timestamp: event.last_timestamp,
        }
    }

    fn pods_path(namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!("/api/v1/namespaces/{ns}/pods"),
            None => "/api/v1/pods".to_string(),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeApiClient {
    async fn list_crashloop_pods(&self) -> GuardianResult<Vec<CrashLoopPod>> {
        let pods: WireList<WirePod> = self.get_json("/api/v1/pods").await?;
        let mut found = Vec::new();
        for pod in pods.items {
            if self
                .protected_namespaces
                .iter()
                .any(|n| n == &pod.metadata.namespace)
            {
                continue;
            }
            for container in &pod.status.container_statuses {
                let waiting_reason = container
                    .state
                    .as_ref()
                    .and_then(|s| s.waiting.as_ref())
                    .and_then(|w| w.reason.as_deref());
                if waiting_reason == Some("CrashLoopBackOff") {
                    found.push(CrashLoopPod {
                        namespace: pod.metadata.namespace.clone(),
                        name: pod.metadata.name.clone(),
                        container: container.name.clone(),
                        restart_count: container.restart_count,
                    });
                }
            }
        }
        Ok(found)
    }

    async fn list_pods(&self, namespace: Option<&str>) -> GuardianResult<Vec<PodSummary>> {
        let pods: WireList<WirePod> = self.get_json(&Self::pods_path(namespace)).await?;
        Ok(pods.items.into_iter().map(Self::pod_summary).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> GuardianResult<PodSummary> {
        let pod: WirePod = self
            .get_json(&format!("/api/v1/namespaces/{namespace}/pods/{name}"))
            .await?;
        Ok(Self::pod_summary(pod))
    }

    async fn pods_on_node(&self, node: &str) -> GuardianResult<Vec<PodSummary>> {
        let pods: WireList<WirePod> = self
            .get_json(&format!(
                "/api/v1/pods?fieldSelector=spec.nodeName%3D{node}"
            ))
            .await?;
        Ok(pods.items.into_iter().map(Self::pod_summary).collect())
    }

    async fn list_nodes(&self) -> GuardianResult<Vec<NodeSummary>> {
        let nodes: WireList<WireNode> = self.get_json("/api/v1/nodes").await?;
        Ok(nodes
            .items
            .into_iter()
            .map(|node| NodeSummary {
                name: node.metadata.name,
                unschedulable: node.spec.unschedulable,
                conditions: node
                    .status
                    .conditions
                    .into_iter()
                    .map(|c| NodeCondition {
                        kind: c.kind,
                        status: c.status,
                        reason: c.reason.unwrap_or_default(),
                        message: c.message.unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn list_deployments(
        &self,
        namespace: Option<&str>,
    ) -> GuardianResult<Vec<DeploymentSummary>> {
        let path = match namespace {
            Some(ns) => format!("/apis/apps/v1/namespaces/{ns}/deployments"),
            None => "/apis/apps/v1/deployments".to_string(),
        };
        let deployments: WireList<WireDeployment> = self.get_json(&path).await?;
        Ok(deployments
            .items
            .into_iter()
            .map(Self::deployment_summary)
            .collect())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> GuardianResult<DeploymentSummary> {
        let deployment: WireDeployment = self
            .get_json(&format!(
                "/apis/apps/v1/namespaces/{namespace}/deployments/{name}"
            ))
            .await?;
        Ok(Self::deployment_summary(deployment))
    }

    async fn list_statefulsets(
        &self,
        namespace: Option<&str>,
    ) -> GuardianResult<Vec<DeploymentSummary>> {
        let path = match namespace {
            Some(ns) => format!("/apis/apps/v1/namespaces/{ns}/statefulsets"),
            None => "/apis/apps/v1/statefulsets".to_string(),
        };
        let sets: WireList<WireDeployment> = self.get_json(&path).await?;
        Ok(sets.items.into_iter().map(Self::deployment_summary).collect())
    }

    async fn list_daemonsets(&self) -> GuardianResult<Vec<DaemonSetSummary>> {
        let sets: WireList<WireDaemonSet> = self.get_json("/apis/apps/v1/daemonsets").await?;
        Ok(sets
            .items
            .into_iter()
            .map(|ds| DaemonSetSummary {
                namespace: ds.metadata.namespace,
                name: ds.metadata.name,
                desired: ds.status.desired_number_scheduled,
                ready: ds.status.number_ready,
                unavailable: ds.status.number_unavailable,
            })
            .collect())
    }

    async fn list_failed_jobs(&self) -> GuardianResult<Vec<JobSummary>> {
        let jobs: WireList<WireJob> = self.get_json("/apis/batch/v1/jobs").await?;
        Ok(jobs
            .items
            .into_iter()
            .filter(|job| {
                job.status.failed > 0
                    && !self
                        .protected_namespaces
                        .iter()
                        .any(|n| n == &job.metadata.namespace)
            })
            .map(|job| {
                let reason = job
                    .status
                    .conditions
                    .iter()
                    .find(|c| c.kind == "Failed" && c.status == "True")
                    .and_then(|c| c.reason.clone())
                    .unwrap_or_default();
                JobSummary {
                    namespace: job.metadata.namespace,
                    name: job.metadata.name,
                    failed: job.status.failed,
                    reason,
                }
            })
            .collect())
    }

    async fn list_replicasets_for(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> GuardianResult<Vec<ReplicaSetSummary>> {
        let sets: WireList<WireReplicaSet> = self
            .get_json(&format!("/apis/apps/v1/namespaces/{namespace}/replicasets"))
            .await?;
        Ok(sets
            .items
            .into_iter()
            .filter(|rs| {
                rs.metadata
                    .owner_references
                    .iter()
                    .any(|r| r.kind == "Deployment" && r.name == deployment)
            })
            .map(|rs| {
                let revision = rs
                    .metadata
                    .annotations
                    .get(REVISION_ANNOTATION)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                ReplicaSetSummary {
                    namespace: rs.metadata.namespace,
                    name: rs.metadata.name,
                    owner_refs: rs
                        .metadata
                        .owner_references
                        .into_iter()
                        .map(|r| OwnerRef {
                            kind: r.kind,
                            name: r.name,
                        })
                        .collect(),
                    revision,
                    template: rs.spec.template,
                }
            })
            .collect())
    }

    async fn list_ingress_routes(&self) -> GuardianResult<Vec<IngressRoute>> {
        let ingresses: WireList<WireIngress> = self
            .get_json("/apis/networking.k8s.io/v1/ingresses")
            .await?;
        Ok(ingresses
            .items
            .into_iter()
            .map(|ingress| IngressRoute {
                namespace: ingress.metadata.namespace,
                name: ingress.metadata.name,
                hosts: ingress
                    .spec
                    .rules
                    .into_iter()
                    .filter_map(|r| r.host)
                    .collect(),
                tls: !ingress.spec.tls.is_empty(),
            })
            .collect())
    }

    async fn list_services(
        &self,
        namespace: Option<&str>,
    ) -> GuardianResult<Vec<ServiceSummary>> {
        let (services_path, endpoints_path) = match namespace {
            Some(ns) => (
                format!("/api/v1/namespaces/{ns}/services"),
                format!("/api/v1/namespaces/{ns}/endpoints"),
            ),
            None => (
                "/api/v1/services".to_string(),
                "/api/v1/endpoints".to_string(),
            ),
        };
        let services: WireList<WireService> = self.get_json(&services_path).await?;
        let endpoints: WireList<super::types::WireEndpoints> =
            self.get_json(&endpoints_path).await?;

        Ok(services
            .items
            .into_iter()
            .map(|service| {
                let ready = endpoints
                    .items
                    .iter()
                    .find(|e| {
                        e.metadata.name == service.metadata.name
                            && e.metadata.namespace == service.metadata.namespace
                    })
                    .map(|e| {
                        e.subsets
                            .iter()
                            .map(|s| s.addresses.len() as i32)
                            .sum::<i32>()
                    })
                    .unwrap_or(0);
                ServiceSummary {
                    namespace: service.metadata.namespace,
                    name: service.metadata.name,
                    cluster_ip: service.spec.cluster_ip,
                    ports: service.spec.ports.into_iter().map(|p| p.port).collect(),
                    endpoints_ready: ready,
                }
            })
            .collect())
    }

    async fn list_hpas(&self, namespace: Option<&str>) -> GuardianResult<serde_json::Value> {
        let path = match namespace {
            Some(ns) => format!("/apis/autoscaling/v2/namespaces/{ns}/horizontalpodautoscalers"),
            None => "/apis/autoscaling/v2/horizontalpodautoscalers".to_string(),
        };
        self.get_json(&path).await
    }

    async fn list_pdbs(&self, namespace: Option<&str>) -> GuardianResult<serde_json::Value> {
        let path = match namespace {
            Some(ns) => format!("/apis/policy/v1/namespaces/{ns}/poddisruptionbudgets"),
            None => "/apis/policy/v1/poddisruptionbudgets".to_string(),
        };
        self.get_json(&path).await
    }

    async fn list_certificates(&self) -> GuardianResult<Vec<CertificateSummary>> {
        let certs: WireList<WireCertificate> = self
            .get_json("/apis/cert-manager.io/v1/certificates")
            .await?;
        let now = Utc::now();
        Ok(certs
            .items
            .into_iter()
            .map(|cert| {
                let ready_condition = cert
                    .status
                    .conditions
                    .iter()
                    .find(|c| c.kind == "Ready");
                CertificateSummary {
                    namespace: cert.metadata.namespace,
                    name: cert.metadata.name,
                    ready: ready_condition.is_some_and(|c| c.status == "True"),
                    message: ready_condition
                        .and_then(|c| c.message.clone())
                        .unwrap_or_default(),
                    days_until_expiry: cert
                        .status
                        .not_after
                        .map(|t| (t - now).num_seconds() as f64 / 86_400.0),
                }
            })
            .collect())
    }

    async fn recent_events(&self, namespace: Option<&str>) -> GuardianResult<Vec<EventRecord>> {
        let path = match namespace {
            Some(ns) => format!("/api/v1/namespaces/{ns}/events?limit=100"),
            None => "/api/v1/events?limit=100".to_string(),
        };
        let events: WireList<WireEvent> = self.get_json(&path).await?;
        Ok(events.items.into_iter().map(Self::event_record).collect())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: Option<&str>,
        tail_lines: u32,
        previous: bool,
    ) -> GuardianResult<String> {
        let mut path =
            format!("/api/v1/namespaces/{namespace}/pods/{name}/log?tailLines={tail_lines}");
        if let Some(container) = container {
            path.push_str(&format!("&container={container}"));
        }
        if previous {
            path.push_str("&previous=true");
        }
        self.get_text(&path).await
    }

    async fn event_stream(
        &self,
    ) -> GuardianResult<BoxStream<'static, GuardianResult<EventRecord>>> {
        let response = self
            .request(reqwest::Method::GET, "/api/v1/events?watch=true")
            .timeout(Duration::from_secs(300))
            .send()
            .await?;
        let response = Self::check(response).await?;

        let bytes = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(
            (bytes, Vec::<u8>::new()),
            |(mut bytes, mut buffer)| async move {
                loop {
                    if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line);
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<WatchLine>(line) {
                            Ok(WatchLine {
                                object: Some(event), ..
                            }) => {
                                return Some((
                                    Ok(Self::event_record(event)),
                                    (bytes, buffer),
                                ));
                            }
                            Ok(_) => continue,
                            Err(err) => {
                                debug!(error = %err, "unparseable watch line skipped");
                                continue;
                            }
                        }
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(err)) => {
                            return Some((Err(GuardianError::Http(err)), (bytes, buffer)));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        self.delete(&format!("/api/v1/namespaces/{namespace}/pods/{name}"))
            .await
    }

    async fn rollout_restart_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> GuardianResult<()> {
        let patch = json!({
            "spec": {"template": {"metadata": {"annotations": {
                RESTARTED_AT_ANNOTATION: Utc::now().to_rfc3339(),
            }}}}
        });
        self.patch_json(
            &format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}"),
            &patch,
        )
        .await
    }

    async fn rollout_restart_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> GuardianResult<()> {
        let patch = json!({
            "spec": {"template": {"metadata": {"annotations": {
                RESTARTED_AT_ANNOTATION: Utc::now().to_rfc3339(),
            }}}}
        });
        self.patch_json(
            &format!("/apis/apps/v1/namespaces/{namespace}/statefulsets/{name}"),
            &patch,
        )
        .await
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> GuardianResult<WorkloadScale> {
        let current: WireDeployment = self
            .get_json(&format!(
                "/apis/apps/v1/namespaces/{namespace}/deployments/{name}"
            ))
            .await?;
        let previous_replicas = current.spec.replicas.unwrap_or(0);
        self.patch_json(
            &format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}"),
            &json!({"spec": {"replicas": replicas}}),
        )
        .await?;
        Ok(WorkloadScale {
            namespace: namespace.to_string(),
            name: name.to_string(),
            previous_replicas,
            replicas,
        })
    }

    async fn patch_deployment_template(
        &self,
        namespace: &str,
        name: &str,
        template: serde_json::Value,
    ) -> GuardianResult<()> {
        self.patch_json(
            &format!("/apis/apps/v1/namespaces/{namespace}/deployments/{name}"),
            &json!({"spec": {"template": template}}),
        )
        .await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        self.delete(&format!(
            "/apis/batch/v1/namespaces/{namespace}/jobs/{name}?propagationPolicy=Background"
        ))
        .await
    }

    async fn set_node_unschedulable(&self, name: &str, unschedulable: bool) -> GuardianResult<()> {
        self.patch_json(
            &format!("/api/v1/nodes/{name}"),
            &json!({"spec": {"unschedulable": unschedulable}}),
        )
        .await
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> GuardianResult<()> {
        let eviction = json!({
            "apiVersion": "policy/v1",
            "kind": "Eviction",
            "metadata": {"name": name, "namespace": namespace},
        });
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/namespaces/{namespace}/pods/{name}/eviction"),
            )
            .json(&eviction)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
