//! Scripted backend for Parley.
//!
//! Implements the `parley-abi` engine traits without a neural network:
//! - The vocabulary is one token per byte (ids 0..=255) plus control tokens.
//! - Each prompt ingest (a batch starting at position 0) pops the next scripted
//!   reply; every decode step then puts a sharp peak on the reply's next token,
//!   falling back to EOS once the reply is exhausted.
//! - Batches are validated the way llama.cpp does (contiguous positions,
//!   in-window, in-vocabulary), and decode failures can be injected.
//! - Model/context acquisition and release are written to a [`Ledger`].

mod context;
mod ledger;
mod model;
mod script;
mod vocab;

pub use context::ScriptedContext;
pub use ledger::{Ledger, ResourceEvent};
pub use model::ScriptedModel;
pub use script::Script;
pub use vocab::{ScriptedVocab, DEFAULT_CONTROL_TOKENS};

use std::path::Path;
use std::sync::Arc;

use parley_abi::{Backend, ContextParameters, EngineError, ModelParameters};

pub struct ScriptedBackend {
    vocab: Arc<ScriptedVocab>,
    script: Script,
    ledger: Ledger,
    next_id: u32,
    fail_model_load: bool,
    fail_context_init: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_vocab(ScriptedVocab::default())
    }

    pub fn with_vocab(vocab: ScriptedVocab) -> Self {
        Self {
            vocab: Arc::new(vocab),
            script: Script::default(),
            ledger: Ledger::default(),
            next_id: 0,
            fail_model_load: false,
            fail_context_init: false,
        }
    }

    /// Queue replies up front. Replies are tokenized with control-token parsing,
    /// so `"4<|eot_id|>"` ends the turn with the end-of-turn token.
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in replies {
            self.script.push_reply(r);
        }
        self
    }

    pub fn failing_model_load(mut self) -> Self {
        self.fail_model_load = true;
        self
    }

    pub fn failing_context_init(mut self) -> Self {
        self.fail_context_init = true;
        self
    }

    /// Shared handle to the reply script; stays live after the backend is moved.
    pub fn script(&self) -> Script {
        self.script.clone()
    }

    /// Shared handle to the resource ledger.
    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    pub fn vocab(&self) -> &ScriptedVocab {
        &self.vocab
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ScriptedBackend {
    type Model = ScriptedModel;
    type Context = ScriptedContext;

    fn load_model(
        &mut self,
        path: &Path,
        _params: &ModelParameters,
    ) -> Result<Self::Model, EngineError> {
        if self.fail_model_load {
            return Err(EngineError::ModelLoad(format!(
                "scripted load failure for {}",
                path.display()
            )));
        }
        if !path.exists() {
            return Err(EngineError::ModelNotFound(path.display().to_string()));
        }
        let id = self.next_id();
        tracing::trace!(id, path = %path.display(), "scripted model loaded");
        Ok(ScriptedModel::new(id, self.vocab.clone(), self.ledger.clone()))
    }

    fn new_context(
        &mut self,
        model: &Self::Model,
        params: &ContextParameters,
    ) -> Result<Self::Context, EngineError> {
        if self.fail_context_init {
            return Err(EngineError::ContextInit("scripted context failure".into()));
        }
        let id = self.next_id();
        tracing::trace!(id, model = model.id(), n_ctx = params.context_size, "scripted context created");
        Ok(ScriptedContext::new(
            id,
            model.vocab(),
            params.context_size,
            self.script.clone(),
            self.ledger.clone(),
        ))
    }
}
