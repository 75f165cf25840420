use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use orchestrator::prompt::{seed_conversation, UserIdentity};
use orchestrator::{ConversationMessage, ConversationOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<ClientMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ClientMessage {
    /// Only prior user and assistant turns are accepted from clients.
    fn into_conversation(self, index: usize) -> Result<ConversationMessage, ApiError> {
        let content = self.content.unwrap_or_default();
        match self.role.as_str() {
            "user" => Ok(ConversationMessage::user(content)),
            "assistant" => Ok(ConversationMessage::assistant(content)),
            other => Err(ApiError::BadRequest(format!(
                "messages[{index}] has unsupported role '{other}'"
            ))),
        }
    }
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let result = answer(&state, &headers, payload).await;
    let status = match &result {
        Ok(outcome) => outcome.termination.as_str(),
        Err(err) => err.label(),
    };
    state
        .metrics
        .record_request(status, started.elapsed().as_secs_f64());

    let outcome = result?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "role": "assistant",
            "content": outcome.answer,
        },
    })))
}

async fn answer(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<ConversationOutcome, ApiError> {
    let user_id = state.verifier.authenticate(headers)?;
    let Json(request) =
        payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let history = request
        .messages
        .ok_or_else(|| ApiError::BadRequest("messages is required".to_string()))?;
    if history.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".to_string()));
    }
    let history = history
        .into_iter()
        .enumerate()
        .map(|(index, message)| message.into_conversation(index))
        .collect::<Result<Vec<_>, _>>()?;

    let profile = state
        .users
        .find_user(user_id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .ok_or_else(|| ApiError::Unauthenticated("user not found".to_string()))?;
    let identity = UserIdentity {
        username: profile.username,
        display_name: profile.display_name,
    };

    let seed = seed_conversation(&state.instruction, &identity, history);
    let outcome = state.conversation.run(seed).await;
    for dispatch in &outcome.dispatches {
        state
            .metrics
            .record_dispatch(&dispatch.function, dispatch.is_error);
    }
    state.metrics.record_rounds(outcome.dispatch_rounds);
    info!(
        user_id,
        termination = outcome.termination.as_str(),
        rounds = outcome.dispatch_rounds,
        dispatches = outcome.dispatches.len(),
        "chat answered"
    );
    Ok(outcome)
}
