use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("record store failure: {0}")]
    Store(String),
    #[error("network request failed: {0}")]
    Network(String),
    #[error("model service returned status {status}: {body}")]
    ModelStatus { status: u16, body: String },
    #[error("invalid model response: {0}")]
    ModelProtocol(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
