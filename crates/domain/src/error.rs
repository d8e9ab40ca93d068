use crate::taxonomy::{
    AnalysisError, ConfigurationError, IterationLimitError, ToolExecutionError,
    ToolSelectionError,
};

/// Shared error type across all Tarsy crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error(transparent)]
    ToolSelection(#[from] ToolSelectionError),

    #[error(transparent)]
    ToolExecution(#[from] ToolExecutionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    IterationLimit(#[from] IterationLimitError),

    /// §4.7: a session's total wall-clock budget was exhausted mid-stage.
    #[error("session timeout: {0}")]
    SessionTimeout(String),

    /// §4.6: a claimed session's ownership was lost (pod died, orphan swept
    /// by another pod) while work was still in flight.
    #[error("claim lost: {0}")]
    ClaimLost(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
