//! Engine error taxonomy.
//!
//! Security-relevant failures collapse into [`EngineError::Unauthorized`]
//! with no detail about whether the referenced resources exist. Workflow
//! shape failures carry the attempted edge and the missing scopes, since the
//! caller can correct those.

use vellum_core::types::JobType;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown job type '{0}'")]
    UnknownJobType(JobType),
    #[error("job dispatch failed: {reason}")]
    JobDispatchFailed { reason: String },
    #[error("job is already in a terminal state")]
    JobAlreadyTerminal,
    #[error("unauthorized")]
    Unauthorized,
    #[error("no transition from '{from}' to '{to}'")]
    NoSuchTransition { from: String, to: String },
    #[error("transition '{transition}' requires scopes: {missing_scopes:?}")]
    Forbidden {
        transition: String,
        missing_scopes: Vec<String>,
    },
    #[error("a job-gated transition '{pending}' is already pending on this version")]
    TransitionAlreadyPending { pending: String },
    #[error("concurrent modification persisted across {attempts} attempts; retry the request")]
    ConcurrentModification { attempts: u32 },
    #[error("not found: {resource}")]
    NotFound { resource: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Errors the caller may safely retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrentModification { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("duplicate id '{id}'")]
    DuplicateId { id: String },
}
