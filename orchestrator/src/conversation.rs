use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::dispatcher::FunctionDispatcher;
use crate::errors::Result;

pub const DEFAULT_MAX_FOLLOWUP_ROUNDS: usize = 3;
pub const DEFAULT_FALLBACK_ANSWER: &str =
    "Sorry, I couldn't complete that request right now. Please try rephrasing your question or try again shortly.";

/// A function call requested by the model, normalized from whichever
/// response shape the provider used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: String,
    pub function_name: String,
    pub raw_arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolInvocation>,
    },
    FunctionResult {
        invocation_id: String,
        name: String,
        content: String,
    },
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ConversationMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ConversationMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ConversationMessage::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            ConversationMessage::System { .. } => "system",
            ConversationMessage::User { .. } => "user",
            ConversationMessage::Assistant { .. } => "assistant",
            ConversationMessage::FunctionResult { .. } => "tool",
        }
    }
}

pub struct ModelRequest<'a> {
    pub messages: &'a [ConversationMessage],
    pub tools: &'a [Value],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub invocations: Vec<ToolInvocation>,
}

/// One round trip to the LLM chat-completion service.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply>;
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Model calls allowed after a dispatch round.
    pub max_followup_rounds: usize,
    pub fallback_answer: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_followup_rounds: DEFAULT_MAX_FOLLOWUP_ROUNDS,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
        }
    }
}

impl LoopConfig {
    pub fn with_max_followup_rounds(mut self, rounds: usize) -> Self {
        self.max_followup_rounds = rounds;
        self
    }

    pub fn with_fallback_answer(mut self, answer: impl Into<String>) -> Self {
        let answer = answer.into();
        if !answer.trim().is_empty() {
            self.fallback_answer = answer;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Answered,
    EmptyAnswer,
    BudgetExhausted,
    ModelFailed,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Answered => "answered",
            Termination::EmptyAnswer => "empty_answer",
            Termination::BudgetExhausted => "budget_exhausted",
            Termination::ModelFailed => "model_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub invocation_id: String,
    pub function: String,
    pub is_error: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// Never empty: either model content or the configured fallback.
    pub answer: String,
    pub termination: Termination,
    pub dispatch_rounds: usize,
    pub dispatches: Vec<DispatchSummary>,
    pub transcript: Vec<ConversationMessage>,
}

/// Bounded model/tool exchange for a single request.
pub struct ConversationLoop {
    model: Arc<dyn ChatModel>,
    dispatcher: Arc<FunctionDispatcher>,
    tools: Vec<Value>,
    config: LoopConfig,
}

impl ConversationLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        dispatcher: Arc<FunctionDispatcher>,
        config: LoopConfig,
    ) -> Self {
        let tools = dispatcher.registry().tool_definitions();
        Self {
            model,
            dispatcher,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &FunctionDispatcher {
        &self.dispatcher
    }

    pub async fn run(&self, seed: Vec<ConversationMessage>) -> ConversationOutcome {
        let mut transcript = seed;
        let mut dispatches = Vec::new();
        let mut dispatch_rounds = 0usize;

        loop {
            let request = ModelRequest {
                messages: &transcript,
                tools: &self.tools,
            };
            let reply = match self.model.complete(request).await {
                Ok(reply) => reply,
                Err(err) => {
                    error!(round = dispatch_rounds, error = %err, "model call failed");
                    return self.finish(
                        transcript,
                        Termination::ModelFailed,
                        None,
                        dispatch_rounds,
                        dispatches,
                    );
                }
            };

            if reply.invocations.is_empty() {
                let content = reply
                    .content
                    .filter(|content| !content.trim().is_empty());
                let termination = if content.is_some() {
                    Termination::Answered
                } else {
                    Termination::EmptyAnswer
                };
                return self.finish(transcript, termination, content, dispatch_rounds, dispatches);
            }

            if dispatch_rounds >= self.config.max_followup_rounds {
                warn!(
                    rounds = dispatch_rounds,
                    pending = reply.invocations.len(),
                    "round budget exhausted with tool calls still pending"
                );
                return self.finish(
                    transcript,
                    Termination::BudgetExhausted,
                    None,
                    dispatch_rounds,
                    dispatches,
                );
            }

            dispatch_rounds += 1;
            info!(
                round = dispatch_rounds,
                invocations = reply.invocations.len(),
                "dispatching tool calls"
            );
            transcript.push(ConversationMessage::Assistant {
                content: reply.content,
                tool_calls: reply.invocations.clone(),
            });
            for invocation in &reply.invocations {
                let result = self.dispatcher.dispatch(invocation).await;
                dispatches.push(DispatchSummary {
                    invocation_id: result.invocation_id.clone(),
                    function: result.function.clone(),
                    is_error: result.is_error,
                });
                transcript.push(result.to_message());
            }
        }
    }

    fn finish(
        &self,
        mut transcript: Vec<ConversationMessage>,
        termination: Termination,
        content: Option<String>,
        dispatch_rounds: usize,
        dispatches: Vec<DispatchSummary>,
    ) -> ConversationOutcome {
        let answer = content.unwrap_or_else(|| self.config.fallback_answer.clone());
        info!(
            termination = termination.as_str(),
            rounds = dispatch_rounds,
            dispatches = dispatches.len(),
            "conversation finished"
        );
        transcript.push(ConversationMessage::assistant(answer.clone()));
        ConversationOutcome {
            answer,
            termination,
            dispatch_rounds,
            dispatches,
            transcript,
        }
    }
}
