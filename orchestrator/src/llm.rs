use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::conversation::{ChatModel, ConversationMessage, ModelReply, ModelRequest, ToolInvocation};
use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            temperature: 0.2,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Chat-completions client speaking the OpenAI wire format.
pub struct OpenAiChatModel {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| OrchestratorError::Configuration(err.to_string()))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            tools: request.tools,
            temperature: self.config.temperature,
        };
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request_id = Uuid::new_v4();
        let mut builder = self
            .http
            .post(url)
            .header("X-Request-Id", request_id.to_string())
            .json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        debug!(%request_id, messages = body.messages.len(), "sending chat completion");
        let response = builder
            .send()
            .await
            .map_err(|err| OrchestratorError::Network(err.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| OrchestratorError::Network(err.to_string()))?;
        if !status.is_success() {
            return Err(OrchestratorError::ModelStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }
        parse_reply(&bytes)
    }
}

/// Decodes a chat-completions response body into a [`ModelReply`], folding
/// both the legacy single `function_call` and the `tool_calls` array into one
/// list of invocations.
pub fn parse_reply(body: &[u8]) -> Result<ModelReply> {
    let response: ChatCompletionResponse = serde_json::from_slice(body)
        .map_err(|err| OrchestratorError::ModelProtocol(err.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OrchestratorError::ModelProtocol("response has no choices".to_string()))?;
    let ResponseMessage {
        content,
        tool_calls,
        function_call,
    } = choice.message;
    let shape = ToolCallShape::classify(tool_calls, function_call);
    Ok(ModelReply {
        content,
        invocations: shape.into_invocations(),
    })
}

enum ToolCallShape {
    None,
    Legacy(WireFunctionCall),
    Batch(Vec<WireToolCall>),
}

impl ToolCallShape {
    fn classify(
        tool_calls: Option<Vec<WireToolCall>>,
        function_call: Option<WireFunctionCall>,
    ) -> Self {
        match (tool_calls, function_call) {
            (Some(calls), _) if !calls.is_empty() => ToolCallShape::Batch(calls),
            (_, Some(call)) => ToolCallShape::Legacy(call),
            _ => ToolCallShape::None,
        }
    }

    fn into_invocations(self) -> Vec<ToolInvocation> {
        match self {
            ToolCallShape::None => Vec::new(),
            ToolCallShape::Legacy(call) => vec![ToolInvocation {
                id: format!("call_{}", Uuid::new_v4().simple()),
                function_name: call.name,
                raw_arguments: call.arguments,
            }],
            ToolCallShape::Batch(calls) => calls
                .into_iter()
                .map(|call| ToolInvocation {
                    id: if call.id.is_empty() {
                        format!("call_{}", Uuid::new_v4().simple())
                    } else {
                        call.id
                    },
                    function_name: call.function.name,
                    raw_arguments: call.function.arguments,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ConversationMessage> for WireMessage {
    fn from(message: &ConversationMessage) -> Self {
        let role = message.role();
        match message {
            ConversationMessage::System { content } | ConversationMessage::User { content } => {
                Self {
                    role,
                    content: Some(content.clone()),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                }
            }
            ConversationMessage::Assistant {
                content,
                tool_calls,
            } => Self {
                role,
                content: content.clone(),
                tool_calls: tool_calls
                    .iter()
                    .map(|invocation| WireToolCall {
                        id: invocation.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunctionCall {
                            name: invocation.function_name.clone(),
                            arguments: invocation.raw_arguments.clone(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            ConversationMessage::FunctionResult {
                invocation_id,
                content,
                ..
            } => Self {
                role,
                content: Some(content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(invocation_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default, deserialize_with = "arguments_as_text")]
    arguments: String,
}

/// Providers send arguments as a JSON-encoded string; some send the object
/// itself. Either way the sanitizer receives text.
fn arguments_as_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_tool_calls_keep_order_and_ids() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        { "id": "call_a", "type": "function", "function": { "name": "get_flight_record_by_id", "arguments": "{\"id\":\"ABC123\"}" } },
                        { "id": "call_b", "type": "function", "function": { "name": "list_recent_flight_records", "arguments": { "limit": 3 } } }
                    ]
                }
            }]
        });
        let reply = parse_reply(body.to_string().as_bytes()).unwrap();
        assert_eq!(reply.content, None);
        assert_eq!(reply.invocations.len(), 2);
        assert_eq!(reply.invocations[0].id, "call_a");
        assert_eq!(reply.invocations[0].raw_arguments, "{\"id\":\"ABC123\"}");
        assert_eq!(reply.invocations[1].raw_arguments, "{\"limit\":3}");
    }

    #[test]
    fn legacy_function_call_becomes_single_invocation() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": { "name": "list_recent_flight_records", "arguments": "{}" }
                }
            }]
        });
        let reply = parse_reply(body.to_string().as_bytes()).unwrap();
        assert_eq!(reply.invocations.len(), 1);
        assert_eq!(reply.invocations[0].function_name, "list_recent_flight_records");
        assert!(reply.invocations[0].id.starts_with("call_"));
    }

    #[test]
    fn plain_answer_and_malformed_bodies() {
        let body = json!({ "choices": [{ "message": { "role": "assistant", "content": "Hi", "tool_calls": [] } }] });
        let reply = parse_reply(body.to_string().as_bytes()).unwrap();
        assert_eq!(reply.content.as_deref(), Some("Hi"));
        assert!(reply.invocations.is_empty());

        assert!(parse_reply(b"{\"choices\": []}").is_err());
        assert!(parse_reply(b"<html>bad gateway</html>").is_err());
    }

    #[test]
    fn wire_messages_use_tool_call_format() {
        let messages = vec![
            ConversationMessage::Assistant {
                content: None,
                tool_calls: vec![ToolInvocation {
                    id: "call_1".to_string(),
                    function_name: "list_recent_flight_records".to_string(),
                    raw_arguments: "{}".to_string(),
                }],
            },
            ConversationMessage::FunctionResult {
                invocation_id: "call_1".to_string(),
                name: "list_recent_flight_records".to_string(),
                content: "[]".to_string(),
            },
        ];
        let wire: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value[0]["tool_calls"][0]["function"]["name"], "list_recent_flight_records");
        assert_eq!(value[0]["content"], Value::Null);
        assert_eq!(value[1]["role"], "tool");
        assert_eq!(value[1]["tool_call_id"], "call_1");
    }
}
