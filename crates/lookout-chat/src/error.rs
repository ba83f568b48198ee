//! Error types for tools, the model client and the chat engine.

use lookout_data::error::ValidationError;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Errors returned to callers of the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("question cannot be empty")]
    EmptyMessage,
    #[error("question exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("turn timed out after {0} seconds")]
    TimedOut(u64),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Category of a failed tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidArguments,
    UnknownTool,
    ExecutionFailed,
}

/// A tool invocation failed.
///
/// Never aborts a turn: the orchestrator turns it into a tool-result message
/// via `to_payload` so the model can correct its next call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    /// Extra top-level fields merged into the payload, e.g. `available_columns`.
    pub details: Map<String, Value>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidArguments, message)
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ToolErrorKind::UnknownTool, format!("unknown tool '{}'", name))
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// JSON sent back to the model as the tool result.
    pub fn to_payload(&self) -> Value {
        let mut out = Map::new();
        out.insert(
            "error".to_string(),
            json!({ "kind": self.kind, "message": self.message }),
        );
        for (k, v) in &self.details {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }
}

impl From<ValidationError> for ToolError {
    fn from(err: ValidationError) -> Self {
        ToolError::invalid_arguments(err.to_string())
    }
}

/// Errors from the chat-completion backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM is disabled in configuration")]
    Disabled,
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timeout after {0} seconds")]
    Timeout(u64),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_)
            | LlmError::Timeout(_)
            | LlmError::InvalidResponse(_)
            | LlmError::EmptyResponse => true,
            LlmError::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            LlmError::Disabled | LlmError::MissingApiKey(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "question cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(4000).to_string(),
            "question exceeds maximum length of 4000 characters"
        );
        let nil = Uuid::nil();
        assert_eq!(
            ChatError::SessionNotFound(nil).to_string(),
            "session not found: 00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            ChatError::TimedOut(120).to_string(),
            "turn timed out after 120 seconds"
        );
    }

    // ---- ToolError ----

    #[test]
    fn test_tool_error_payload() {
        let err = ToolError::invalid_arguments("unknown field 'REGION'")
            .with_detail("available_columns", json!(["FEED_ID", "THEATER"]));
        assert_eq!(
            err.to_payload(),
            json!({
                "error": {"kind": "invalid_arguments", "message": "unknown field 'REGION'"},
                "available_columns": ["FEED_ID", "THEATER"]
            })
        );
    }

    #[test]
    fn test_tool_error_from_validation_keeps_kind() {
        let err: ToolError = ValidationError::UnknownOperator("like".into()).into();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
        assert_eq!(err.message, "unknown operator 'like'");
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolError::unknown_tool("weather");
        assert_eq!(err.kind, ToolErrorKind::UnknownTool);
        assert_eq!(err.to_string(), "unknown tool 'weather'");
    }

    // ---- LlmError ----

    #[test]
    fn test_llm_error_retryable() {
        assert!(LlmError::Http("connection reset".into()).is_retryable());
        assert!(LlmError::Timeout(60).is_retryable());
        assert!(LlmError::EmptyResponse.is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!LlmError::Disabled.is_retryable());
        assert!(!LlmError::MissingApiKey("OPENAI_API_KEY".into()).is_retryable());
    }

    #[test]
    fn test_llm_error_display() {
        assert_eq!(
            LlmError::MissingApiKey("OPENAI_API_KEY".into()).to_string(),
            "API key not set (expected in $OPENAI_API_KEY)"
        );
        assert_eq!(
            LlmError::Status { status: 500, body: "oops".into() }.to_string(),
            "LLM returned HTTP 500: oops"
        );
    }
}
