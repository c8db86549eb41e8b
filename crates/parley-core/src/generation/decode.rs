use rand::RngCore;
use tracing::{debug, trace};

use parley_abi::{Batch, EngineError, InferenceEngine, SamplingParameters, Token};

use super::utils::drain_utf8;
use super::{Generation, GenerationLoop, StopReason};
use crate::error::Result;
use crate::sampling::SamplingPipeline;

impl GenerationLoop {
    /// Sampling phase. `logits` belong to position `cursor - 1`.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn sample_tokens<E, R, C, F>(
        &mut self,
        engine: &mut E,
        sampler: &mut SamplingPipeline<R>,
        params: &SamplingParameters,
        mut logits: Vec<f32>,
        mut cursor: usize,
        cancel: &C,
        on_fragment: &mut F,
    ) -> Result<Generation>
    where
        E: InferenceEngine + ?Sized,
        R: RngCore,
        C: Fn() -> bool,
        F: FnMut(&str),
    {
        let prompt_tokens = cursor;
        let capacity = engine.context_capacity();
        let vocab_size = engine.vocab_size();

        let mut window: Vec<Token> = params.penalty_window.clone();
        let mut tokens: Vec<Token> = Vec::new();
        let mut text = String::new();
        let mut staging: Vec<u8> = Vec::with_capacity(64);
        let mut batch = Batch::new(1);

        let mut emit = |text: &mut String, s: &str| {
            if !s.is_empty() {
                on_fragment(s);
                text.push_str(s);
            }
        };

        let reason = if params.max_tokens == 0 {
            StopReason::MaxTokens
        } else {
            loop {
                if cancel() {
                    debug!(generated = tokens.len(), "cancel requested");
                    break StopReason::Cancelled;
                }

                let token = sampler.sample_with_window(&logits, params, &window, vocab_size)?;
                trace!(token = token.0, cursor, "sampled");

                if self.is_stop_token(&*engine, token) {
                    debug!(token = token.0, "stop token sampled");
                    break StopReason::StopToken;
                }

                staging.extend_from_slice(&engine.detokenize_one(token)?);
                tokens.push(token);
                if params.penalty_last_n > 0 {
                    window.push(token);
                    if window.len() > params.penalty_last_n {
                        let excess = window.len() - params.penalty_last_n;
                        window.drain(..excess);
                    }
                }

                let done = if tokens.len() >= params.max_tokens {
                    Some(StopReason::MaxTokens)
                } else if cursor >= capacity {
                    Some(StopReason::Overflowed)
                } else {
                    None
                };

                if done.is_some() {
                    let tail = String::from_utf8_lossy(&staging).into_owned();
                    staging.clear();
                    emit(&mut text, &tail);
                } else {
                    let delta = drain_utf8(&mut staging);
                    emit(&mut text, &delta);
                }

                if let Some(reason) = done {
                    break reason;
                }

                batch.clear();
                batch.add(token, cursor, true);
                logits = engine
                    .decode_batch(&batch)?
                    .pop()
                    .ok_or_else(|| EngineError::Decode(format!("no logits at position {cursor}")))?;
                cursor += 1;
            }
        };

        if !staging.is_empty() {
            let tail = String::from_utf8_lossy(&staging).into_owned();
            emit(&mut text, &tail);
        }

        Ok(Generation {
            text,
            tokens,
            reason,
            prompt_tokens,
            cursor,
        })
    }
}
