use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters;
use crate::conversation::{ConversationMessage, ToolInvocation};
use crate::errors::OrchestratorError;
use crate::records::RecordStore;
use crate::registry::{FunctionName, FunctionRegistry};
use crate::sanitize::{sanitize, SanitizeError, SanitizedArgs};
use crate::serialize::to_stable_value;
use crate::signer::UrlSigner;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{function}' is missing required argument '{argument}'")]
    MissingRequiredArgument {
        function: FunctionName,
        argument: &'static str,
    },
    #[error("function '{function}' failed: {source}")]
    AdapterFailure {
        function: FunctionName,
        #[source]
        source: OrchestratorError,
    },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::UnknownFunction(_) => "unknown_function",
            DispatchError::MissingRequiredArgument { .. } => "missing_required_argument",
            DispatchError::AdapterFailure { .. } => "adapter_failure",
        }
    }

    fn payload(&self) -> Value {
        json!({
            "error": self.code(),
            "details": self.to_string(),
        })
    }
}

/// Outcome of one dispatched invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResult {
    pub invocation_id: String,
    pub function: String,
    pub payload: Value,
    pub is_error: bool,
}

impl FunctionResult {
    /// Serialized payload as sent back to the model.
    pub fn content(&self) -> String {
        self.payload.to_string()
    }

    pub fn to_message(&self) -> ConversationMessage {
        ConversationMessage::FunctionResult {
            invocation_id: self.invocation_id.clone(),
            name: self.function.clone(),
            content: self.content(),
        }
    }
}

/// Maps invocations onto sanitizer plus adapter and captures every outcome,
/// success or failure, as a [`FunctionResult`].
#[derive(Clone)]
pub struct FunctionDispatcher {
    registry: Arc<FunctionRegistry>,
    store: Arc<dyn RecordStore>,
    signer: Arc<dyn UrlSigner>,
}

impl FunctionDispatcher {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        store: Arc<dyn RecordStore>,
        signer: Arc<dyn UrlSigner>,
    ) -> Self {
        Self {
            registry,
            store,
            signer,
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, invocation: &ToolInvocation) -> FunctionResult {
        let outcome = self
            .run(&invocation.function_name, &invocation.raw_arguments)
            .await;
        match outcome {
            Ok(payload) => {
                debug!(function = %invocation.function_name, id = %invocation.id, "function succeeded");
                FunctionResult {
                    invocation_id: invocation.id.clone(),
                    function: invocation.function_name.clone(),
                    payload,
                    is_error: false,
                }
            }
            Err(err) => {
                warn!(function = %invocation.function_name, id = %invocation.id, error = %err, "function failed");
                FunctionResult {
                    invocation_id: invocation.id.clone(),
                    function: invocation.function_name.clone(),
                    payload: err.payload(),
                    is_error: true,
                }
            }
        }
    }

    async fn run(&self, name: &str, raw_arguments: &str) -> Result<Value, DispatchError> {
        let spec = self
            .registry
            .lookup(name)
            .ok_or_else(|| DispatchError::UnknownFunction(name.to_string()))?;
        let function = spec.name;
        let args = sanitize(spec, raw_arguments).map_err(|err| match err {
            SanitizeError::MissingRequiredArgument(argument) => {
                DispatchError::MissingRequiredArgument { function, argument }
            }
        })?;
        let payload = self
            .execute(function, &args)
            .await
            .map_err(|source| DispatchError::AdapterFailure { function, source })?;
        to_stable_value(&payload).map_err(|source| DispatchError::AdapterFailure { function, source })
    }

    async fn execute(
        &self,
        function: FunctionName,
        args: &SanitizedArgs,
    ) -> Result<Value, OrchestratorError> {
        let store = self.store.as_ref();
        let value = match function {
            FunctionName::GetFlightRecordById => {
                serde_json::to_value(adapters::find_record(store, required(args, "id")?).await?)?
            }
            FunctionName::GetFlightRecordAttachments => serde_json::to_value(
                adapters::record_attachments(store, self.signer.as_ref(), required(args, "id")?)
                    .await?,
            )?,
            FunctionName::ListRecentFlightRecords => {
                let limit = args.int("limit").unwrap_or(1).max(1) as usize;
                serde_json::to_value(adapters::recent_records(store, limit).await?)?
            }
            FunctionName::SearchFlightRecords => {
                let query = adapters::build_search_query(args);
                serde_json::to_value(adapters::search_records(store, &query).await?)?
            }
        };
        Ok(value)
    }
}

fn required<'a>(args: &'a SanitizedArgs, name: &str) -> Result<&'a str, OrchestratorError> {
    args.str(name).ok_or_else(|| {
        OrchestratorError::Configuration(format!("sanitized arguments lack '{name}'"))
    })
}
