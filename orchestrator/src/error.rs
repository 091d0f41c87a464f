//! Orchestrator-specific error types

use calc_shared::{CalcId, SharedError, StatusKind, TargetType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Compute backend error: {message}")]
    BackendError { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Network communication error: {message}")]
    NetworkError { message: String },

    #[error("Durable store error: {message}")]
    StoreError { message: String },

    /// Both persistence attempts failed
    #[error("Failed to persist {target} after retry: {message}")]
    PersistenceFailed { target: TargetType, message: String },

    #[error("Cannot persist {calc_id}: status is {status:?} without a result")]
    NothingToPersist { calc_id: CalcId, status: StatusKind },

    #[error("Strategy mismatch for {calc_id}: manager runs {expected} calculations")]
    StrategyMismatch {
        calc_id: CalcId,
        expected: calc_shared::CalcType,
    },

    #[error("Orchestrator for {calc_id} was already started")]
    AlreadyStarted { calc_id: CalcId },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(err: reqwest::Error) -> Self {
        OrchestratorError::NetworkError {
            message: err.to_string(),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
