//! Error taxonomy for the session layer.

use parley_abi::EngineError;
use thiserror::Error;

use crate::sampling::SamplingError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Invalid paths or parameters, vocabulary mismatch, or an operation
    /// attempted before the session is initialized.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fatal, non-retried engine failure (tokenize, detokenize, decode, load).
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Filtering left nothing to sample from.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// The context window is exhausted.
    #[error("context window exhausted at position {position} (capacity {capacity})")]
    Overflow { position: usize, capacity: usize },

    /// The conversation cannot be rendered into a prompt.
    #[error("template error: {0}")]
    Template(String),
}

impl From<SamplingError> for SessionError {
    fn from(e: SamplingError) -> Self {
        match e {
            SamplingError::VocabularyMismatch { .. } => SessionError::Configuration(e.to_string()),
            SamplingError::NoCandidates => SessionError::Sampling(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
