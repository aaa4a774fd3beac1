use crate::types::{ChatMessage, ModelReply, ToolCallRequest, ToolDescriptor};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

// Generous bound so a slow completion cannot hang a chat request forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model provider returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the language model service. Check that the endpoint is available.".to_string()
                } else if err.is_timeout() {
                    "The language model request timed out. Please try again shortly.".to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            "The language model rejected the configured credentials.".to_string()
                        }
                        StatusCode::TOO_MANY_REQUESTS => {
                            "The language model is rate limiting requests. Please retry later."
                                .to_string()
                        }
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            "The language model service is currently unavailable.".to_string()
                        }
                        _ => format!(
                            "The language model request failed with status {}.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while contacting the language model.".to_string()
                }
            }
            ModelError::InvalidResponse(_) => {
                "The language model returned a response that could not be processed.".to_string()
            }
        }
    }
}

/// Opaque capability: given messages and a tool set, produce either a final
/// answer or a batch of tool-call requests.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError>;
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(base_url, api_key, Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }
}

#[async_trait]
impl ModelProvider for OpenAiClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        let url = self.endpoint("/v1/chat/completions");
        let payload = OpenAiChatRequest {
            model: request.model.clone(),
            messages: to_wire(&request.messages),
            tools: tool_declarations(&request.tools),
            stream: false,
        };
        info!(
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending request to model provider"
        );

        let response: OpenAiChatResponse = self
            .http
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received response from model provider");

        parse_reply(response)
    }
}

fn to_wire(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| WireMessage {
            role: message.role.as_str().to_string(),
            content: if message.content.is_empty() && !message.tool_calls.is_empty() {
                None
            } else {
                Some(message.content.clone())
            },
            tool_calls: if message.tool_calls.is_empty() {
                None
            } else {
                Some(
                    message
                        .tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            kind: "function".to_string(),
                            function: WireFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: message.tool_call_id.clone(),
        })
        .collect()
}

fn tool_declarations(tools: &[ToolDescriptor]) -> Option<Vec<Value>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description.as_deref().unwrap_or_default(),
                        "parameters": tool
                            .input_schema
                            .clone()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    }
                })
            })
            .collect(),
    )
}

fn parse_reply(response: OpenAiChatResponse) -> Result<ModelReply, ModelError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .ok_or_else(|| ModelError::InvalidResponse("missing message in first choice".into()))?;

    if let Some(calls) = message.tool_calls.filter(|calls| !calls.is_empty()) {
        let requests = calls
            .into_iter()
            .map(|call| {
                let arguments = if call.function.arguments.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|err| {
                        ModelError::InvalidResponse(format!(
                            "tool call arguments are not valid JSON: {err}"
                        ))
                    })?
                };
                Ok(ToolCallRequest {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        return Ok(ModelReply::ToolCalls(requests));
    }

    match message.content {
        Some(content) => Ok(ModelReply::Answer(content)),
        None => Err(ModelError::InvalidResponse(
            "response carries neither content nor tool calls".into(),
        )),
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    // The wire format carries arguments as a JSON-encoded string.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    #[test]
    fn endpoint_joins_paths_correctly() {
        let client = OpenAiClient::new("https://api.openai.com/", "sk-test");
        assert_eq!(
            client.endpoint("/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn wire_conversion_preserves_roles_and_tool_plumbing() {
        let call = ToolCallRequest {
            id: "call-1".into(),
            name: "get_yields".into(),
            arguments: json!({"protocol": "aave"}),
        };
        let messages = vec![
            ChatMessage::new(MessageRole::System, "stay concise"),
            ChatMessage::new(MessageRole::User, "best yields?"),
            ChatMessage::assistant_tool_calls(vec![call]),
            ChatMessage::tool_result("call-1", "4.2%"),
        ];

        let wire = to_wire(&messages);
        let roles: Vec<_> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert!(wire[2].content.is_none());
        let calls = wire[2].tool_calls.as_ref().expect("tool calls present");
        assert_eq!(calls[0].function.name, "get_yields");
        assert_eq!(wire[3].tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn tool_declarations_default_missing_schemas() {
        let tools = vec![ToolDescriptor {
            name: "get_yields".into(),
            description: None,
            input_schema: None,
        }];
        let declared = tool_declarations(&tools).expect("non-empty");
        assert_eq!(declared[0]["function"]["parameters"]["type"], "object");
        assert!(tool_declarations(&[]).is_none());
    }

    #[test]
    fn parse_reply_returns_answer_for_plain_content() {
        let response: OpenAiChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "hello", "tool_calls": null}}]
        }))
        .expect("deserializes");

        assert_eq!(
            parse_reply(response).expect("parses"),
            ModelReply::Answer("hello".into())
        );
    }

    #[test]
    fn parse_reply_decodes_tool_call_arguments() {
        let response: OpenAiChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call-9",
                    "type": "function",
                    "function": {"name": "get_yields", "arguments": "{\"chain\":\"base\"}"}
                }]
            }}]
        }))
        .expect("deserializes");

        match parse_reply(response).expect("parses") {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_yields");
                assert_eq!(calls[0].arguments, json!({"chain": "base"}));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn parse_reply_rejects_empty_choices() {
        let response: OpenAiChatResponse =
            serde_json::from_value(json!({"choices": []})).expect("deserializes");
        assert!(matches!(
            parse_reply(response),
            Err(ModelError::InvalidResponse(_))
        ));
    }
}
