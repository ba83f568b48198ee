//! Tool-calling chat engine over the Lookout dataset.
//!
//! Provides the tool registry, the session store, the chat-completion
//! client, and the orchestration loop that ties them together.

pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod tools;

#[cfg(test)]
mod fixtures;

pub use error::{ChatError, LlmError, ToolError, ToolErrorKind};
pub use llm::{
    ChatModel, CompletionRequest, ModelMessage, ModelReply, OpenAiClient, ScriptedModel,
    ToolDefinition, ToolInvocation,
};
pub use orchestrator::{AskResponse, Orchestrator, RetryPolicy, SessionHistory};
pub use session::{Session, SessionStore, ToolCallRecord, Turn, TurnGuard, TurnOutcome};
pub use tools::{FeedsSearchTool, ParametersTool, Tool, ToolKind, ToolRegistry};
