use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use orchestrator::errors::{OrchestratorError, Result};
use orchestrator::{
    Attachment, ChatModel, ConversationLoop, ConversationMessage, FlightRecord,
    FunctionDispatcher, FunctionRegistry, LoopConfig, MemoryRecordStore, ModelReply,
    ModelRequest, RecordStore, SearchQuery, Sha256UrlSigner, ToolInvocation,
};
use parking_lot::Mutex;

pub const FALLBACK: &str = "I could not finish looking that up. Please try again.";

pub fn flight_record(id: &str, day: u32) -> FlightRecord {
    let at = Utc.with_ymd_and_hms(2024, 5, day, 9, 15, 0).unwrap();
    FlightRecord {
        id: id.to_string(),
        flight_date: at,
        aircraft_registration: "VH-OQA".to_string(),
        flight_number: Some(format!("QF{day}")),
        origin: Some("SYD".to_string()),
        destination: Some("MEL".to_string()),
        pilot: Some("Alex Morgan".to_string()),
        technician: None,
        status: "closed".to_string(),
        has_defect: day % 2 == 0,
        defect_description: (day % 2 == 0).then(|| "hydraulic leak, left gear".to_string()),
        remarks: None,
        created_at: at,
        updated_at: at,
        attachments: vec![Attachment {
            id: format!("{id}-att"),
            file_name: "techlog.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            file_size: 9_007_199_254_740_993,
            storage_key: format!("records/{id}/techlog.pdf"),
        }],
    }
}

/// A record store that remembers the limits it was asked for.
pub struct RecordingStore {
    inner: MemoryRecordStore,
    pub recent_limits: Mutex<Vec<usize>>,
}

impl RecordingStore {
    pub fn new(records: Vec<FlightRecord>) -> Self {
        Self {
            inner: MemoryRecordStore::new(records),
            recent_limits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<FlightRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<FlightRecord>> {
        self.recent_limits.lock().push(limit);
        self.inner.list_recent(limit).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightRecord>> {
        self.inner.search(query).await
    }
}

/// Replays a fixed script of replies; once the script runs out it keeps
/// asking for `list_recent_flight_records`.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply>>>,
    pub requests: Mutex<Vec<Vec<ConversationMessage>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        self.requests.lock().push(request.messages.to_vec());
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Ok(tool_call(
                &format!("call_{}", self.calls()),
                "list_recent_flight_records",
                "{}",
            ))
        })
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ModelReply {
    ModelReply {
        content: None,
        invocations: vec![ToolInvocation {
            id: id.to_string(),
            function_name: name.to_string(),
            raw_arguments: arguments.to_string(),
        }],
    }
}

pub fn answer(text: &str) -> Result<ModelReply> {
    Ok(ModelReply {
        content: Some(text.to_string()),
        invocations: Vec::new(),
    })
}

pub fn provider_down() -> Result<ModelReply> {
    Err(OrchestratorError::Network("connection reset".to_string()))
}

pub fn signer() -> Arc<Sha256UrlSigner> {
    Arc::new(Sha256UrlSigner::new(
        "https://files.example.test",
        "integration-secret",
        Duration::from_secs(900),
    ))
}

pub fn conversation(
    model: Arc<ScriptedModel>,
    store: Arc<dyn RecordStore>,
    max_followup_rounds: usize,
) -> ConversationLoop {
    let dispatcher = FunctionDispatcher::new(Arc::new(FunctionRegistry::new()), store, signer());
    ConversationLoop::new(
        model,
        Arc::new(dispatcher),
        LoopConfig::default()
            .with_max_followup_rounds(max_followup_rounds)
            .with_fallback_answer(FALLBACK),
    )
}

/// Content of the last function-result message in a transcript.
pub fn last_function_result(messages: &[ConversationMessage]) -> Option<serde_json::Value> {
    messages.iter().rev().find_map(|message| match message {
        ConversationMessage::FunctionResult { content, .. } => serde_json::from_str(content).ok(),
        _ => None,
    })
}
