use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("deal {0} not found")]
    NotFound(Uuid),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("caller is not authorized for this deal")]
    Unauthorized,
    #[error("deal {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Stable machine-readable code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::InvalidState(_) => "INVALID_STATE",
            PipelineError::Unauthorized => "UNAUTHORIZED",
            PipelineError::Conflict(_) => "CONFLICT",
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
            PipelineError::Store(_) => "INTERNAL",
        }
    }
}
