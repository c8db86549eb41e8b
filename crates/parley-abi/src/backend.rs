use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::batch::Batch;
use crate::error::EngineError;
use crate::handle::Release;
use crate::params::{ContextParameters, ModelParameters};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn system<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::System,
            content: s.into(),
        }
    }
    #[inline]
    pub fn user<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::User,
            content: s.into(),
        }
    }
    #[inline]
    pub fn assistant<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::Assistant,
            content: s.into(),
        }
    }
}

/// Text <-> token mapping owned by a loaded model.
pub trait Vocabulary {
    /// `add_special` prepends BOS; `parse_special` lets control-token markup in
    /// `text` map to control tokens instead of plain bytes.
    fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        parse_special: bool,
    ) -> Result<Vec<Token>, EngineError>;

    /// Raw piece for one token. May be empty or a partial UTF-8 sequence.
    fn token_piece(&self, token: Token) -> Result<Vec<u8>, EngineError>;

    fn vocab_size(&self) -> usize;

    fn eos_token(&self) -> Token;
}

/// The mutable half of an engine: KV state plus the forward pass.
pub trait DecodeContext {
    /// Run the forward pass over `batch`. Returns one logits row (length ==
    /// vocab size) per position flagged for logits, in batch order.
    fn decode(&mut self, batch: &Batch) -> Result<Vec<Vec<f32>>, EngineError>;

    /// Active context window (n_ctx).
    fn capacity(&self) -> usize;

    /// Drop cached sequence/KV state while keeping the context allocated.
    fn clear_cache(&mut self) {}
}

/// Backend-agnostic loader for models and contexts.
///
/// Models and contexts come back as raw resources; the core wraps each one in
/// a [`Scoped`](crate::handle::Scoped) guard as soon as it is acquired.
pub trait Backend {
    type Model: Vocabulary + Release;
    type Context: DecodeContext + Release;

    /// `path` is interpreted by the backend. An identifier that resolves to
    /// nothing is reported as [`EngineError::ModelNotFound`].
    fn load_model(
        &mut self,
        path: &Path,
        params: &ModelParameters,
    ) -> Result<Self::Model, EngineError>;

    fn new_context(
        &mut self,
        model: &Self::Model,
        params: &ContextParameters,
    ) -> Result<Self::Context, EngineError>;
}

/// Everything the generation loop needs from the engine, in one place.
pub trait InferenceEngine {
    fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        parse_special: bool,
    ) -> Result<Vec<Token>, EngineError>;

    fn detokenize_one(&self, token: Token) -> Result<Vec<u8>, EngineError>;

    fn decode_batch(&mut self, batch: &Batch) -> Result<Vec<Vec<f32>>, EngineError>;

    fn vocab_size(&self) -> usize;

    fn eos_token(&self) -> Token;

    fn context_capacity(&self) -> usize;

    fn clear_cache(&mut self) {}
}
