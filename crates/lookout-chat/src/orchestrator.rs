//! Orchestration loop: drives the model's function-calling protocol for one
//! question and records the resulting turn.
//!
//! A turn moves through `AwaitingModel -> ExecutingTools -> AwaitingModel ...`
//! until the model replies without tool calls (`Done`). Tool calls are run one
//! at a time in the order the model listed them, and the next model request
//! is only made once every result of the round is in.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lookout_core::config::{ChatConfig, LlmConfig};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, LlmError};
use crate::llm::{ChatModel, CompletionRequest, ModelMessage, ModelReply, ToolInvocation};
use crate::prompt::build_system_prompt;
use crate::session::{Session, SessionStore, ToolCallRecord, Turn, TurnOutcome};
use crate::tools::ToolRegistry;

/// Answer returned when the tool-round budget is exhausted.
pub const ROUND_LIMIT_ANSWER: &str = "I could not complete this request within the allowed \
number of tool calls. Please try a more specific question.";

/// Answer returned when the model backend stays unavailable after retries.
pub const UPSTREAM_UNAVAILABLE_ANSWER: &str = "The language model service is currently \
unavailable, so I cannot answer right now. Please try again shortly.";

/// Bounded exponential backoff for model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl From<&LlmConfig> for RetryPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub session_id: Uuid,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    pub session_id: Uuid,
    pub messages: Vec<Turn>,
}

enum TurnState {
    AwaitingModel,
    ExecutingTools(Vec<ToolInvocation>),
    Done { answer: String, outcome: TurnOutcome },
}

/// Coordinates sessions, tools and the model.
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    sessions: SessionStore,
    config: ChatConfig,
    retry: RetryPolicy,
    system_prompt: String,
}

impl Orchestrator {
    /// `feed_columns` are listed in the system prompt.
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        config: ChatConfig,
        retry: RetryPolicy,
        feed_columns: &[String],
    ) -> Self {
        let system_prompt = build_system_prompt(config.system_prompt.as_deref(), feed_columns);
        Self {
            model,
            tools,
            sessions: SessionStore::new(config.session_timeout_minutes),
            config,
            retry,
            system_prompt,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn new_session(&self) -> Result<Uuid, ChatError> {
        self.sessions.create()
    }

    pub fn session(&self, session_id: Uuid) -> Result<Session, ChatError> {
        self.sessions.get(session_id)
    }

    pub fn history(&self, session_id: Uuid) -> Result<SessionHistory, ChatError> {
        Ok(SessionHistory {
            session_id,
            messages: self.sessions.history(session_id)?,
        })
    }

    /// Empty a session's transcript once any in-flight turn has finished.
    pub async fn clear_history(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.sessions.clear(session_id).await
    }

    pub fn delete_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.sessions.delete(session_id)
    }

    pub fn purge_expired(&self) -> usize {
        self.sessions.purge_expired()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    /// Answer `question` within a session, creating one if `session_id` is `None`.
    ///
    /// The turn holds the session's turn lock for its whole duration. On
    /// timeout, or when the model stays unavailable, nothing is written to
    /// the transcript. A session created by a call that times out is removed
    /// again, since its id never reaches the caller.
    pub async fn ask(
        &self,
        session_id: Option<Uuid>,
        question: &str,
    ) -> Result<AskResponse, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if question.chars().count() > self.config.max_question_chars {
            return Err(ChatError::MessageTooLong(self.config.max_question_chars));
        }

        let created = session_id.is_none();
        let session_id = match session_id {
            Some(id) => id,
            None => self.sessions.create()?,
        };

        let guard = self.sessions.begin_turn(session_id).await?;
        let prior = guard.transcript()?;

        let budget = Duration::from_secs(self.config.turn_timeout_secs);
        let turn = match tokio::time::timeout(budget, self.run_turn(&prior, question)).await {
            Ok(turn) => turn,
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_secs = self.config.turn_timeout_secs,
                    "Turn timed out; discarding partial trace"
                );
                drop(guard);
                if created {
                    if let Err(e) = self.sessions.delete(session_id) {
                        warn!(session_id = %session_id, error = %e, "Failed to drop unreturned session");
                    }
                }
                return Err(ChatError::TimedOut(self.config.turn_timeout_secs));
            }
        };

        let response = AskResponse {
            answer: turn.answer.clone(),
            tool_calls: turn.tool_calls.clone(),
            session_id,
            outcome: turn.outcome,
        };

        if turn.outcome.is_persisted() {
            guard.commit(turn)?;
        }

        info!(
            session_id = %session_id,
            tool_calls = response.tool_calls.len(),
            outcome = ?response.outcome,
            "Turn finished"
        );
        Ok(response)
    }

    async fn run_turn(&self, prior: &[Turn], question: &str) -> Turn {
        let asked_at = Utc::now();
        let mut messages = self.replay(prior);
        messages.push(ModelMessage::User(question.to_string()));

        let mut trace: Vec<ToolCallRecord> = Vec::new();
        let mut round: u32 = 0;
        let mut state = TurnState::AwaitingModel;

        loop {
            state = match state {
                TurnState::AwaitingModel => match self.complete_with_retry(&messages).await {
                    Ok(reply) if reply.is_final() => TurnState::Done {
                        answer: reply.content.unwrap_or_default(),
                        outcome: TurnOutcome::Answered,
                    },
                    Ok(reply) if round >= self.config.max_tool_rounds => {
                        warn!(
                            rounds = round,
                            requested = reply.tool_calls.len(),
                            "Tool round limit reached"
                        );
                        TurnState::Done {
                            answer: ROUND_LIMIT_ANSWER.to_string(),
                            outcome: TurnOutcome::RoundLimitReached,
                        }
                    }
                    Ok(ModelReply {
                        content,
                        tool_calls,
                    }) => {
                        round += 1;
                        messages.push(ModelMessage::Assistant {
                            content,
                            tool_calls: tool_calls.clone(),
                        });
                        TurnState::ExecutingTools(tool_calls)
                    }
                    Err(e) => {
                        warn!("Model unavailable after retries: {}", e);
                        TurnState::Done {
                            answer: UPSTREAM_UNAVAILABLE_ANSWER.to_string(),
                            outcome: TurnOutcome::UpstreamUnavailable,
                        }
                    }
                },
                TurnState::ExecutingTools(calls) => {
                    debug!(round, calls = calls.len(), "Executing tool round");
                    for call in &calls {
                        let content = self.tools.dispatch(call, round, &mut trace).await;
                        messages.push(ModelMessage::Tool {
                            call_id: call.id.clone(),
                            content,
                        });
                    }
                    TurnState::AwaitingModel
                }
                TurnState::Done { answer, outcome } => {
                    return Turn {
                        question: question.to_string(),
                        tool_calls: trace,
                        answer,
                        outcome,
                        asked_at,
                        answered_at: Utc::now(),
                    };
                }
            };
        }
    }

    async fn complete_with_retry(
        &self,
        messages: &[ModelMessage],
    ) -> Result<ModelReply, LlmError> {
        let request = CompletionRequest {
            messages: std::iter::once(ModelMessage::System(self.system_prompt.clone()))
                .chain(messages.iter().cloned())
                .collect(),
            tools: self.tools.describe(),
        };

        let mut attempt = 0;
        loop {
            match self.model.complete(&request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Model call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rebuild the model conversation from persisted turns.
    fn replay(&self, prior: &[Turn]) -> Vec<ModelMessage> {
        let mut messages = Vec::new();
        for turn in prior {
            messages.push(ModelMessage::User(turn.question.clone()));

            let mut records = turn.tool_calls.iter().peekable();
            while let Some(first) = records.next() {
                let mut group = vec![first];
                while let Some(next) = records.next_if(|r| r.round == first.round) {
                    group.push(next);
                }
                messages.push(ModelMessage::Assistant {
                    content: None,
                    tool_calls: group
                        .iter()
                        .map(|r| ToolInvocation {
                            id: r.call_id.clone(),
                            name: r.name.clone(),
                            arguments: match &r.arguments {
                                serde_json::Value::String(raw) => raw.clone(),
                                other => other.to_string(),
                            },
                        })
                        .collect(),
                });
                for r in group {
                    messages.push(ModelMessage::Tool {
                        call_id: r.call_id.clone(),
                        content: r.output.to_string(),
                    });
                }
            }

            messages.push(ModelMessage::Assistant {
                content: Some(turn.answer.clone()),
                tool_calls: Vec::new(),
            });
        }
        messages
    }
}

// =============================================================================
// Tests
// =============================================================================
