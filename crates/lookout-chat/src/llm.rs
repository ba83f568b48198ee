//! Chat-completion client abstraction.
//!
//! `ChatModel` is the seam the orchestrator talks to. `OpenAiClient` speaks
//! the OpenAI-compatible `/v1/chat/completions` protocol with function
//! calling; `ScriptedModel` replays canned replies for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lookout_core::config::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::LlmError;

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments exactly as the model produced them.
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }
}

/// One message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolInvocation>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

/// Function definition advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the arguments.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// The model's reply: either tool calls or a final answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ModelReply {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolInvocation>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, LlmError>;

    /// Model identifier for logs and health output.
    fn model_name(&self) -> &str;
}

// =============================================================================
// OpenAiClient
// =============================================================================

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    config: LlmConfig,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// Build a client, reading the API key from `config.api_key_env`.
    ///
    /// A missing key is not an error here; requests fail with
    /// `LlmError::MissingApiKey` until one is provided.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": request.messages.iter().map(message_to_wire).collect::<Vec<_>>(),
            "temperature": self.config.temperature,
        });
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.config.api_key_env.clone()))?;

        debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(self.url())
            .bearer_auth(api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.request_timeout_secs)
                } else {
                    LlmError::Http(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Http(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        parse_reply(&text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn message_to_wire(message: &ModelMessage) -> Value {
    match message {
        ModelMessage::System(content) => json!({"role": "system", "content": content}),
        ModelMessage::User(content) => json!({"role": "user", "content": content}),
        ModelMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut msg = json!({"role": "assistant", "content": content});
            if !tool_calls.is_empty() {
                msg["tool_calls"] = tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.arguments},
                        })
                    })
                    .collect();
            }
            msg
        }
        ModelMessage::Tool { call_id, content } => {
            json!({"role": "tool", "tool_call_id": call_id, "content": content})
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Parse a chat-completions response body.
fn parse_reply(body: &str) -> Result<ModelReply, LlmError> {
    let parsed: WireResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("unexpected response shape: {}", e)))?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyResponse)?
        .message;

    let tool_calls: Vec<ToolInvocation> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolInvocation {
            id: c.id,
            name: c.function.name,
            arguments: c.function.arguments,
        })
        .collect();
    let content = message.content.filter(|c| !c.trim().is_empty());

    if tool_calls.is_empty() && content.is_none() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(ModelReply {
        content,
        tool_calls,
    })
}

// =============================================================================
// ScriptedModel
// =============================================================================

/// Model that replays a fixed script of replies and records every request.
///
/// Once the script runs out every call fails with `LlmError::EmptyResponse`.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Script of successful replies only.
    pub fn replying(replies: Vec<ModelReply>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Result<ModelReply, LlmError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| LlmError::InvalidResponse("script lock poisoned".into()))?
            .pop_front();
        next.unwrap_or(Err(LlmError::EmptyResponse))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Wire format ----

    #[test]
    fn test_parse_final_answer() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"There are 3 Pacific feeds."}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert!(reply.is_final());
        assert_eq!(reply.content.as_deref(), Some("There are 3 Pacific feeds."));
    }

    #[test]
    fn test_parse_tool_calls() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_1","type":"function","function":{"name":"feeds_search","arguments":"{\"limit\":2}"}},
            {"id":"call_2","type":"function","function":{"name":"encoder_get_params","arguments":"{}"}}
        ]}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert!(!reply.is_final());
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].name, "feeds_search");
        assert_eq!(reply.tool_calls[0].arguments, r#"{"limit":2}"#);
        assert_eq!(reply.tool_calls[1].id, "call_2");
    }

    #[test]
    fn test_parse_empty_choices() {
        assert_eq!(parse_reply(r#"{"choices":[]}"#), Err(LlmError::EmptyResponse));
    }

    #[test]
    fn test_parse_blank_content_without_calls() {
        let body = r#"{"choices":[{"message":{"content":"   ","tool_calls":null}}]}"#;
        assert_eq!(parse_reply(body), Err(LlmError::EmptyResponse));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_reply("<html>bad gateway</html>"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_message_to_wire() {
        let msg = ModelMessage::Assistant {
            content: None,
            tool_calls: vec![ToolInvocation::new("c1", "feeds_search", json!({"limit": 1}))],
        };
        let wire = message_to_wire(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["content"], Value::Null);
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "feeds_search");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"limit":1}"#);

        let tool = message_to_wire(&ModelMessage::Tool {
            call_id: "c1".into(),
            content: "{}".into(),
        });
        assert_eq!(tool, json!({"role": "tool", "tool_call_id": "c1", "content": "{}"}));
    }

    #[test]
    fn test_request_body_includes_tools() {
        let client = OpenAiClient::new(LlmConfig::default()).unwrap();
        let request = CompletionRequest {
            messages: vec![ModelMessage::System("sys".into()), ModelMessage::User("hi".into())],
            tools: vec![ToolDefinition {
                name: "decoder_get_params".into(),
                description: "Decoder settings".into(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
        };
        let body = client.body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["tools"][0]["function"]["name"], "decoder_get_params");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let config = LlmConfig {
            endpoint: "http://localhost:8080/".into(),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.url(), "http://localhost:8080/v1/chat/completions");
    }

    // ---- Client guards ----

    #[tokio::test]
    async fn test_disabled_client() {
        let config = LlmConfig {
            enabled: false,
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(config).unwrap().with_api_key("k");
        let request = CompletionRequest {
            messages: vec![],
            tools: vec![],
        };
        assert_eq!(client.complete(&request).await, Err(LlmError::Disabled));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = LlmConfig {
            api_key_env: "LOOKOUT_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(config).unwrap();
        assert!(!client.has_api_key());
        let request = CompletionRequest {
            messages: vec![],
            tools: vec![],
        };
        assert_eq!(
            client.complete(&request).await,
            Err(LlmError::MissingApiKey(
                "LOOKOUT_TEST_KEY_THAT_IS_NEVER_SET".into()
            ))
        );
    }

    // ---- ScriptedModel ----

    #[tokio::test]
    async fn test_scripted_model_replays_and_records() {
        let model = ScriptedModel::replying(vec![ModelReply::answer("one")]);
        model.push(Err(LlmError::Timeout(5)));
        let request = CompletionRequest {
            messages: vec![ModelMessage::User("q".into())],
            tools: vec![],
        };

        assert_eq!(model.complete(&request).await, Ok(ModelReply::answer("one")));
        assert_eq!(model.complete(&request).await, Err(LlmError::Timeout(5)));
        assert_eq!(model.complete(&request).await, Err(LlmError::EmptyResponse));
        assert_eq!(model.call_count(), 3);
        assert_eq!(model.requests()[0].messages, vec![ModelMessage::User("q".into())]);
    }
}
