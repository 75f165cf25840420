//! Tool orchestration core for the maintenance-operations chat endpoint.
//!
//! A chat request is answered by looping between an LLM chat-completion
//! service and a closed set of read-only flight-record functions. The model
//! picks functions from the [`registry`], the [`dispatcher`] sanitizes the
//! model-supplied arguments and runs the matching [`adapters`], and the
//! [`conversation`] loop feeds results back until the model answers or the
//! round budget runs out.

pub mod adapters;
pub mod conversation;
pub mod dispatcher;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod records;
pub mod registry;
pub mod sanitize;
pub mod serialize;
pub mod signer;

pub use conversation::{
    ChatModel, ConversationLoop, ConversationMessage, ConversationOutcome, DispatchSummary,
    LoopConfig, ModelReply, ModelRequest, Termination, ToolInvocation,
};
pub use dispatcher::{DispatchError, FunctionDispatcher, FunctionResult};
pub use errors::{OrchestratorError, Result};
pub use llm::{OpenAiChatModel, OpenAiConfig};
pub use memory::MemoryRecordStore;
pub use prompt::UserIdentity;
pub use records::{Attachment, FlightRecord, RecordStore, SearchQuery};
pub use registry::{FunctionName, FunctionRegistry, FunctionSpec};
pub use sanitize::{sanitize, ArgValue, SanitizeError, SanitizedArgs};
pub use signer::{Sha256UrlSigner, UrlSigner};
