//! Conversation session: one model, one context, one running dialog.
//!
//! Initialization is staged. `initialize_model` loads the model,
//! `initialize_context` creates the context on top of it, and only then can
//! `submit` run. A failed stage leaves the session at the previous stage with
//! nothing half-built.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use parley_abi::{
    Backend, ChatTurn, ContextParameters, EngineError, InferenceEngine, ModelParameters,
    SamplingParameters, Scoped, Token, Vocabulary,
};

use crate::config::{SessionConfig, Validate};
use crate::error::{Result, SessionError};
use crate::format::prompt_format::{TemplateKind, select_template};
use crate::format::prompting::ChatTemplate;
use crate::format::stream_filter::StreamFilter;
use crate::generation::{GenerationLoop, StopReason};
use crate::memory::ConversationState;
use crate::sampling::SamplingPipeline;

mod handle;

pub use handle::EngineHandle;

enum Stage<B: Backend> {
    Uninitialized,
    ModelLoaded(Scoped<B::Model>),
    Ready(EngineHandle<B>),
}

pub struct ConversationSession<B: Backend> {
    stage: Stage<B>,
    backend: B,
    template: Box<dyn ChatTemplate>,
    conversation: ConversationState,
    sampler: SamplingPipeline,
    stop_flag: Arc<AtomicBool>,
}

impl<B: Backend> ConversationSession<B> {
    /// An uninitialized session using the default (Llama 3) template.
    pub fn new(backend: B) -> Self {
        Self::with_template(backend, TemplateKind::default())
    }

    pub fn with_template(backend: B, kind: TemplateKind) -> Self {
        Self {
            stage: Stage::Uninitialized,
            backend,
            template: select_template(kind),
            conversation: ConversationState::new(),
            sampler: SamplingPipeline::from_entropy(),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a ready session from config: template, model, context, then the
    /// optional system prompt.
    pub fn open(backend: B, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let mut s = Self::with_template(backend, config.template);
        if let Some(seed) = config.sampling.seed {
            s.sampler.reseed(seed);
        }
        s.initialize_model(&config.model_path, &config.model)?;
        s.initialize_context(&config.context)?;
        if let Some(sys) = config.system_prompt.as_deref() {
            s.set_system_prompt(sys);
        }
        Ok(s)
    }

    /// Load the model. Any previous model and context are released first; on
    /// failure the session is left uninitialized.
    pub fn initialize_model<P: AsRef<Path>>(
        &mut self,
        path: P,
        params: &ModelParameters,
    ) -> Result<()> {
        let path = path.as_ref();
        self.stage = Stage::Uninitialized;
        params.validate()?;

        let model = self.backend.load_model(path, params).map_err(|e| {
            warn!(path = %path.display(), error = %e, "model load failed");
            match e {
                EngineError::ModelNotFound(what) => {
                    SessionError::Configuration(format!("model not found: {what}"))
                }
                other => SessionError::from(other),
            }
        })?;
        info!(
            path = %path.display(),
            vocab_size = model.vocab_size(),
            gpu_layers = params.gpu_layers,
            "model loaded"
        );
        self.stage = Stage::ModelLoaded(Scoped::new(model));
        Ok(())
    }

    /// Create the context (replacing an existing one). Requires a loaded model.
    /// On failure the session falls back to the model-loaded stage.
    pub fn initialize_context(&mut self, params: &ContextParameters) -> Result<()> {
        let model = match std::mem::replace(&mut self.stage, Stage::Uninitialized) {
            Stage::Uninitialized => {
                return Err(SessionError::Configuration(
                    "model must be initialized before the context".into(),
                ));
            }
            Stage::ModelLoaded(model) => model,
            Stage::Ready(handle) => handle.into_model(),
        };

        if let Err(e) = params.validate() {
            self.stage = Stage::ModelLoaded(model);
            return Err(e);
        }

        let end_of_turn = match resolve_end_of_turn(&*model, self.template.as_ref()) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "end-of-turn marker rejected");
                self.stage = Stage::ModelLoaded(model);
                return Err(e);
            }
        };

        let context = match self.backend.new_context(&model, params) {
            Ok(c) => Scoped::new(c),
            Err(e) => {
                warn!(error = %e, "context creation failed");
                self.stage = Stage::ModelLoaded(model);
                return Err(e.into());
            }
        };

        info!(
            n_ctx = params.context_size,
            n_batch = params.batch_size,
            threads = params.thread_count,
            end_of_turn = end_of_turn.0,
            "context ready"
        );
        self.stage = Stage::Ready(EngineHandle::new(
            model,
            context,
            end_of_turn,
            params.batch_size,
        ));
        Ok(())
    }

    /// Swap the chat template. With a model loaded, the new end-of-turn marker
    /// must resolve first; on failure nothing changes.
    pub fn set_template(&mut self, kind: TemplateKind) -> Result<()> {
        let template = select_template(kind);
        match &mut self.stage {
            Stage::Uninitialized => {}
            Stage::ModelLoaded(model) => {
                resolve_end_of_turn(&**model, template.as_ref())?;
            }
            Stage::Ready(handle) => {
                let eot = resolve_end_of_turn(handle.model(), template.as_ref())?;
                handle.set_end_of_turn(eot);
            }
        }
        debug!(template = template.name(), "template selected");
        self.template = template;
        Ok(())
    }

    pub fn template(&self) -> &dyn ChatTemplate {
        self.template.as_ref()
    }

    /// Replace the system message at position 0 (or insert one). Earlier
    /// turns are kept.
    pub fn set_system_prompt<S: Into<String>>(&mut self, text: S) {
        self.conversation.set_system(text);
    }

    pub fn reset_conversation(&mut self) {
        self.conversation.clear();
        debug!("conversation reset");
    }

    pub fn messages(&self) -> &[ChatTurn] {
        self.conversation.turns()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.stage, Stage::Ready(_))
    }

    /// Set to `true` to stop the call in flight before its next token. The
    /// flag is cleared when a call starts.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn engine(&self) -> Option<&EngineHandle<B>> {
        match &self.stage {
            Stage::Ready(h) => Some(h),
            _ => None,
        }
    }

    fn model(&self) -> Result<&B::Model> {
        match &self.stage {
            Stage::Uninitialized => Err(SessionError::Configuration(
                "model is not initialized".into(),
            )),
            Stage::ModelLoaded(m) => Ok(&**m),
            Stage::Ready(h) => Ok(h.model()),
        }
    }

    /// Tokenize plain text. Control-token markup in `text` is not parsed.
    pub fn encode(&self, text: &str, add_special: bool) -> Result<Vec<Token>> {
        Ok(self.model()?.tokenize(text, add_special, false)?)
    }

    /// Concatenate token pieces; invalid UTF-8 is replaced.
    pub fn decode(&self, tokens: &[Token]) -> Result<String> {
        let model = self.model()?;
        let mut bytes = Vec::new();
        for &t in tokens {
            bytes.extend(model.token_piece(t)?);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Append `user_message`, generate a reply and record it.
    ///
    /// `on_fragment` sees the reply as it is produced, with control markers
    /// removed. On error the user message stays in the history and no
    /// assistant message is added; a rejected call (not ready, bad
    /// parameters) changes nothing.
    pub fn submit<F>(
        &mut self,
        user_message: &str,
        params: &SamplingParameters,
        mut on_fragment: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let Stage::Ready(engine) = &mut self.stage else {
            return Err(SessionError::Configuration(
                "session is not ready: initialize model and context first".into(),
            ));
        };
        params.validate()?;

        self.conversation.push_user(user_message);
        let prompt = self.template.render(self.conversation.turns())?;
        debug!(
            turns = self.conversation.len(),
            template = self.template.name(),
            "prompt rendered"
        );

        if let Some(seed) = params.seed {
            self.sampler.reseed(seed);
        }
        self.stop_flag.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop_flag);

        let mut filter = StreamFilter::new(self.template.control_markers().iter().copied());
        let mut reply = String::new();
        let mut generation = GenerationLoop::new(vec![engine.end_of_turn()], engine.batch_size());

        let outcome = generation.run(
            engine,
            &mut self.sampler,
            &prompt,
            params,
            || stop.load(Ordering::Relaxed),
            |fragment| {
                let out = filter.push(fragment);
                if !out.is_empty() {
                    on_fragment(&out);
                    reply.push_str(&out);
                }
            },
        )?;

        let tail = filter.finish();
        if !tail.is_empty() {
            on_fragment(&tail);
            reply.push_str(&tail);
        }

        if outcome.reason == StopReason::Overflowed {
            let capacity = engine.context_capacity();
            let position = outcome.cursor.max(outcome.prompt_tokens);
            warn!(position, capacity, "context window exhausted");
            return Err(SessionError::Overflow { position, capacity });
        }

        self.conversation.push_assistant(reply.clone());
        Ok(reply)
    }
}

/// The template's end-of-turn marker as a single control token.
fn resolve_end_of_turn<V: Vocabulary + ?Sized>(
    vocab: &V,
    template: &dyn ChatTemplate,
) -> Result<Token> {
    let marker = template.end_of_turn();
    let tokens = vocab.tokenize(marker, false, true)?;
    match tokens.as_slice() {
        [t] => Ok(*t),
        _ => Err(SessionError::Configuration(format!(
            "end-of-turn marker {marker:?} tokenizes to {} tokens, expected 1",
            tokens.len()
        ))),
    }
}
