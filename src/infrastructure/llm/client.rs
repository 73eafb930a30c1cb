//! HTTP client for the chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;

use crate::domain::errors::{GuardianError, GuardianResult};
use crate::domain::models::config::Config;
use crate::domain::ports::llm::{ChatMessage, ChatModel, ChatResponse, ToolSpec};

use super::retry::RetryPolicy;
use super::types::{
    parse_response, to_wire_message, to_wire_tool, ChatCompletionRequest,
    ChatCompletionResponse, LlmApiError,
};

pub struct ChatCompletionsConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatCompletionsConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            timeout_secs: 120,
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

/// Chat-completions client with connection pooling and retry on
/// transient errors.
pub struct ChatCompletionsClient {
    http: ReqwestClient,
    config: ChatCompletionsConfig,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> GuardianResult<Self> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| GuardianError::Config(format!("cannot build LLM client: {e}")))?;
        Ok(Self {
            http,
            config,
            retry: RetryPolicy::default(),
        })
    }

    async fn send_request(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmApiError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmApiError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> GuardianResult<ChatResponse> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(to_wire_message).collect(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(to_wire_tool).collect())
            },
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };

        let response = self
            .retry
            .execute(|| self.send_request(&request))
            .await
            .map_err(|err| GuardianError::Llm(err.to_string()))?;

        parse_response(response).map_err(|err| GuardianError::Llm(err.to_string()))
    }
}
