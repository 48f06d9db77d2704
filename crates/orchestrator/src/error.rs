use thiserror::Error;

/// §7 error taxonomy for the orchestrator process: everything that can go
/// wrong either persisting an `Operation`, reaching the worker process, or
/// validating a request before it ever touches the store.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("operation store error: {0}")]
    Persistence(String),

    #[error("operation {0} not found")]
    NotFound(uuid::Uuid),

    #[error("invalid operation config: {0}")]
    Validation(String),

    #[error("operation {0} is not in a state that allows this action (status: {1:?})")]
    InvalidTransition(uuid::Uuid, model::operation::types::OperationStatus),

    #[error("worker process unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("worker transport error: {0}")]
    WorkerTransport(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<crate::config::ConfigError> for OrchestratorError {
    fn from(e: crate::config::ConfigError) -> Self {
        OrchestratorError::Config(e.to_string())
    }
}

impl OrchestratorError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Validation(_) | OrchestratorError::InvalidTransition(_, _) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::WorkerUnavailable(_) | OrchestratorError::WorkerTransport(_) => {
                StatusCode::BAD_GATEWAY
            }
            OrchestratorError::Persistence(_) | OrchestratorError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
