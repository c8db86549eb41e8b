//! Sampling pipeline: one step's logits + parameters -> one committed token.
//!
//! Stage order is fixed: penalties -> top-k -> top-p -> temperature -> draw.
//! Reordering the stages changes the output distribution.

pub mod candidates;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;

use parley_abi::{SamplingParameters, Token};

use candidates::{
    apply_penalties, apply_temperature, candidates_from, greedy, softmax, top_k, top_p,
};

/// Temperatures at or below this select greedily.
pub const GREEDY_TEMPERATURE: f32 = 1e-5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingError {
    #[error("logits length {got} does not match vocabulary size {expected}")]
    VocabularyMismatch { expected: usize, got: usize },

    #[error("no candidates left to sample from")]
    NoCandidates,
}

/// Stateless apart from the random source, which is replaceable (`R`).
#[derive(Debug, Clone)]
pub struct SamplingPipeline<R = StdRng> {
    rng: R,
}

impl SamplingPipeline<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic mode: identical seeds replay identical draws.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

impl<R: RngCore> SamplingPipeline<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Sample using `params.penalty_window` as the penalty window.
    pub fn sample(
        &mut self,
        logits: &[f32],
        params: &SamplingParameters,
        vocab_size: usize,
    ) -> Result<Token, SamplingError> {
        self.sample_with_window(logits, params, &params.penalty_window, vocab_size)
    }

    /// Sample with an explicit penalty window (the generation loop passes the
    /// caller's window extended with generated tokens).
    pub fn sample_with_window(
        &mut self,
        logits: &[f32],
        params: &SamplingParameters,
        window: &[Token],
        vocab_size: usize,
    ) -> Result<Token, SamplingError> {
        if logits.len() != vocab_size {
            return Err(SamplingError::VocabularyMismatch {
                expected: vocab_size,
                got: logits.len(),
            });
        }

        // 1) penalties on raw scores
        let mut scores = logits.to_vec();
        if !window.is_empty() && !params.penalties_disabled() {
            apply_penalties(
                &mut scores,
                window,
                params.repeat_penalty,
                params.frequency_penalty,
                params.presence_penalty,
            );
        }

        let mut cands = candidates_from(&scores);

        // 2) + 3) truncation filters
        top_k(&mut cands, params.top_k as usize);
        top_p(&mut cands, params.top_p);

        if cands.is_empty() {
            return Err(SamplingError::NoCandidates);
        }

        // 4) temperature, with the near-zero guard
        if params.temperature <= GREEDY_TEMPERATURE {
            return greedy(&cands)
                .map(|c| c.token)
                .ok_or(SamplingError::NoCandidates);
        }
        apply_temperature(&mut cands, params.temperature);

        // 5) draw from the categorical distribution
        let probs = softmax(&cands);
        let r: f64 = self.rng.random();
        let mut cum = 0.0;
        for (c, p) in cands.iter().zip(&probs) {
            cum += p;
            if r < cum {
                return Ok(c.token);
            }
        }
        // Rounding left `cum` just under 1.0.
        cands
            .last()
            .map(|c| c.token)
            .ok_or(SamplingError::NoCandidates)
    }
}
