//! Qdrant-backed vector memory.
//!
//! Issue/resolution pairs are embedded through the LLM backend's
//! embeddings endpoint and stored as points; recall is a similarity query.
//! Degrades to a no-op memory when Qdrant is unreachable at startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::ports::memory::{IssueMemory, RecalledIssue};

const VECTOR_SIZE: usize = 1536;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QdrantMemory {
    http: reqwest::Client,
    qdrant_url: String,
    collection: String,
    embeddings_url: String,
    api_key: String,
    embedding_model: String,
    available: AtomicBool,
}

impl QdrantMemory {
    pub fn new(
        qdrant_url: &str,
        collection: &str,
        llm_base_url: &str,
        llm_api_key: &str,
        embedding_model: &str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            qdrant_url: qdrant_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            embeddings_url: format!("{}/embeddings", llm_base_url.trim_end_matches('/')),
            api_key: llm_api_key.to_string(),
            embedding_model: embedding_model.to_string(),
            available: AtomicBool::new(false),
        }
    }

    /// Reach Qdrant and create the collection when missing.
    pub async fn connect(&self) {
        let result: GuardianResult<()> = async {
            let collections: Value = self
                .http
                .get(format!("{}/collections", self.qdrant_url))
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(|e| GuardianError::unavailable("qdrant", e.to_string()))?
                .json()
                .await?;

            let exists = collections["result"]["collections"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .any(|c| c["name"].as_str() == Some(self.collection.as_str()))
                })
                .unwrap_or(false);

            if !exists {
                let response = self
                    .http
                    .put(format!(
                        "{}/collections/{}",
                        self.qdrant_url, self.collection
                    ))
                    .json(&json!({
                        "vectors": {"size": VECTOR_SIZE, "distance": "Cosine"},
                    }))
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| GuardianError::unavailable("qdrant", e.to_string()))?;
                if !response.status().is_success() {
                    return Err(GuardianError::unavailable(
                        "qdrant",
                        format!("collection create returned HTTP {}", response.status()),
                    ));
                }
                info!(collection = %self.collection, "created vector collection");
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.available.store(true, Ordering::SeqCst);
                info!(url = %self.qdrant_url, "vector memory connected");
            }
            Err(err) => {
                warn!(error = %err, "vector memory disabled");
            }
        }
    }

    async fn embed(&self, text: &str) -> GuardianResult<Vec<f64>> {
        let response = self
            .http
            .post(&self.embeddings_url)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": self.embedding_model, "input": text}))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::Llm(format!("embedding request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(GuardianError::Llm(format!(
                "embedding returned HTTP {}",
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        body["data"][0]["embedding"]
            .as_array()
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
            .ok_or_else(|| GuardianError::Llm("embedding response missing vector".to_string()))
    }
}

#[async_trait]
impl IssueMemory for QdrantMemory {
    async fn store_resolution(
        &self,
        issue: &str,
        resolution: &str,
        metadata: Value,
    ) -> GuardianResult<()> {
        if !self.available() {
            return Ok(());
        }
        let vector = self.embed(issue).await?;
        let point_id = Uuid::new_v4().to_string();
        let response = self
            .http
            .put(format!(
                "{}/collections/{}/points",
                self.qdrant_url, self.collection
            ))
            .json(&json!({
                "points": [{
                    "id": point_id,
                    "vector": vector,
                    "payload": {
                        "issue": issue,
                        "resolution": resolution,
                        "timestamp": Utc::now().to_rfc3339(),
                        "metadata": metadata,
                    },
                }],
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("qdrant", e.to_string()))?;
        if !response.status().is_success() {
            return Err(GuardianError::unavailable(
                "qdrant",
                format!("upsert returned HTTP {}", response.status()),
            ));
        }
        info!(point_id = %point_id, "stored issue vector");
        Ok(())
    }

    async fn recall_similar(
        &self,
        query: &str,
        top_k: usize,
    ) -> GuardianResult<Vec<RecalledIssue>> {
        if !self.available() {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        let response = self
            .http
            .post(format!(
                "{}/collections/{}/points/query",
                self.qdrant_url, self.collection
            ))
            .json(&json!({
                "query": vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GuardianError::unavailable("qdrant", e.to_string()))?;
        let body: Value = response.json().await?;
        let points = body["result"]["points"].as_array().cloned().unwrap_or_default();
        Ok(points
            .into_iter()
            .map(|point| RecalledIssue {
                issue: point["payload"]["issue"].as_str().unwrap_or_default().to_string(),
                resolution: point["payload"]["resolution"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                score: point["score"].as_f64().unwrap_or(0.0),
                timestamp: point["payload"]["timestamp"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
