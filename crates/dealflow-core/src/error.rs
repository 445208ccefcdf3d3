//! Core error type for the Dealflow platform.
//!
//! `DealflowError` is used by the stores, the run recorder and the run
//! service. Step-level failures never surface here: the step invoker folds
//! them into failed `StepResult`s instead.

#[derive(Debug, thiserror::Error)]
pub enum DealflowError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DealflowError {
    /// Short machine-readable kind, used in persisted failure payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}
