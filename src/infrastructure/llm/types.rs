//! Wire types for the chat-completions dialect, with conversions to and
//! from the domain chat types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ports::llm::{ChatMessage, ChatResponse, ChatRole, ToolCall, ToolSpec};

/// Errors from the LLM HTTP surface, classified for retry decisions.
#[derive(Debug, Error)]
pub enum LlmApiError {
    #[error("rate limited (HTTP 429): {0}")]
    RateLimited(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("invalid request (HTTP {status}): {message}")]
    Invalid { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LlmApiError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited(body),
            s if s >= 500 => Self::Server {
                status: s,
                message: body,
            },
            s => Self::Invalid {
                status: s,
                message: body,
            },
        }
    }

    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Server { .. } | Self::Network(_)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction,
}

#[derive(Debug, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// JSON-encoded arguments object, per the wire dialect.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: WireMessage,
}

pub fn to_wire_message(message: &ChatMessage) -> WireMessage {
    let role = match message.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    };
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: Some("function".to_string()),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };
    WireMessage {
        role: role.to_string(),
        content: Some(message.content.clone()),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

pub fn to_wire_tool(spec: &ToolSpec) -> WireTool {
    WireTool {
        kind: "function",
        function: WireFunction {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        },
    }
}

pub fn parse_response(response: ChatCompletionResponse) -> Result<ChatResponse, LlmApiError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmApiError::Malformed("no choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::Null)
            };
            ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(LlmApiError::from_status(429, String::new()).is_transient());
        assert!(LlmApiError::from_status(503, String::new()).is_transient());
        assert!(!LlmApiError::from_status(401, String::new()).is_transient());
        assert!(LlmApiError::Network("reset".into()).is_transient());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "list_pods", "arguments": "{\"namespace\": \"default\"}"}
                    }]
                }
            }]
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(response).unwrap();
        assert!(parsed.content.is_empty());
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "list_pods");
        assert_eq!(parsed.tool_calls[0].arguments["namespace"], "default");
    }

    #[test]
    fn test_parse_response_without_choices_fails() {
        let response = ChatCompletionResponse { choices: vec![] };
        assert!(parse_response(response).is_err());
    }

    #[test]
    fn test_tool_message_round_trip() {
        let message = ChatMessage::tool_result("call_1", "42 pods");
        let wire = to_wire_message(&message);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
        assert!(wire.tool_calls.is_none());
    }
}
