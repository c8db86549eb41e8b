use thiserror::Error;

/// Failures reported by an inference backend. All of them are fatal for the
/// call that hit them; the core never retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The model identifier does not resolve to anything the backend can load.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to create context: {0}")]
    ContextInit(String),

    #[error("tokenization failed: {0}")]
    Tokenize(String),

    #[error("detokenization failed for token {token}: {reason}")]
    Detokenize { token: i32, reason: String },

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("position {position} exceeds context capacity {capacity}")]
    ContextOverflow { position: usize, capacity: usize },

    #[error("decode failed: {0}")]
    Decode(String),
}
