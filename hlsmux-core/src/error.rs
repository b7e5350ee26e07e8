use crate::naming::NameError;
use thiserror::Error;

/// Failure of a playlist or initialization-file generator
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("No tracks configured")]
    NoTracks,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MuxerError {
    /// The name is not (or no longer) indexed. Expected when a segment is
    /// evicted between a playlist fetch and the content request.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] GenerateError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl MuxerError {
    /// Whether the same request may succeed when retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, MuxerError>;
