//! Prompt-then-token generation over an [`InferenceEngine`].
//!
//! One call walks `Idle -> PromptIngest -> Sampling` and ends in `Completed`,
//! `Overflowed` or `Failed`. The cursor is the next absolute position to write
//! and never passes the context capacity.

use rand::RngCore;
use tracing::{debug, info, warn};

use parley_abi::{InferenceEngine, SamplingParameters, Token};

use crate::error::Result;
use crate::format::format::FormattedPrompt;
use crate::sampling::SamplingPipeline;

mod decode;
mod prefill;
mod utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    PromptIngest,
    Sampling,
    Completed,
    Overflowed,
    Failed,
}

/// Why a call stopped. Failures are not listed: they come back as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// End-of-sequence or end-of-turn token sampled.
    StopToken,
    MaxTokens,
    /// The cancel predicate returned true.
    Cancelled,
    /// The next position would not fit in the context window.
    Overflowed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Everything passed to the fragment callback, concatenated.
    pub text: String,
    /// Generated tokens, stop token excluded.
    pub tokens: Vec<Token>,
    pub reason: StopReason,
    pub prompt_tokens: usize,
    /// Final cursor position.
    pub cursor: usize,
}

#[derive(Debug, Clone)]
pub struct GenerationLoop {
    stop_tokens: Vec<Token>,
    batch_size: usize,
    state: LoopState,
}

impl GenerationLoop {
    /// `stop_tokens` are checked in addition to the engine's EOS token.
    /// `batch_size` caps tokens per prompt-ingest decode call.
    pub fn new(stop_tokens: Vec<Token>, batch_size: usize) -> Self {
        Self {
            stop_tokens,
            batch_size: batch_size.max(1),
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn is_stop_token<E: InferenceEngine + ?Sized>(&self, engine: &E, token: Token) -> bool {
        token == engine.eos_token() || self.stop_tokens.contains(&token)
    }

    /// Run one generation call.
    ///
    /// `cancel` is polled before every sampled token; `on_fragment` receives
    /// non-empty UTF-8 text as it is produced. Engine, sampling and template
    /// failures abort the call and leave the loop in `Failed`.
    pub fn run<E, R, C, F>(
        &mut self,
        engine: &mut E,
        sampler: &mut SamplingPipeline<R>,
        prompt: &FormattedPrompt,
        params: &SamplingParameters,
        cancel: C,
        mut on_fragment: F,
    ) -> Result<Generation>
    where
        E: InferenceEngine + ?Sized,
        R: RngCore,
        C: Fn() -> bool,
        F: FnMut(&str),
    {
        self.state = LoopState::PromptIngest;
        let result = self
            .ingest(engine, prompt)
            .and_then(|ingested| match ingested {
                prefill::Ingested::Ready { logits, cursor } => {
                    self.state = LoopState::Sampling;
                    self.sample_tokens(
                        engine,
                        sampler,
                        params,
                        logits,
                        cursor,
                        &cancel,
                        &mut on_fragment,
                    )
                }
                prefill::Ingested::Overflowed { prompt_tokens } => Ok(Generation {
                    text: String::new(),
                    tokens: Vec::new(),
                    reason: StopReason::Overflowed,
                    prompt_tokens,
                    cursor: 0,
                }),
            });

        match &result {
            Ok(g) => {
                self.state = match g.reason {
                    StopReason::Overflowed => LoopState::Overflowed,
                    _ => LoopState::Completed,
                };
                info!(
                    reason = ?g.reason,
                    prompt_tokens = g.prompt_tokens,
                    generated = g.tokens.len(),
                    cursor = g.cursor,
                    "generation finished"
                );
            }
            Err(e) => {
                self.state = LoopState::Failed;
                warn!(error = %e, "generation failed");
            }
        }
        debug!(state = ?self.state, "loop state");
        result
    }
}
