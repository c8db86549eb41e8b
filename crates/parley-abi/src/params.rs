//! User-facing parameter structs for model loading, context creation and sampling.
//!
//! Defaults match what the session has always shipped with; every field can be
//! omitted from a config document thanks to `#[serde(default)]`.

use serde::{Deserialize, Serialize};

use crate::token::Token;

/// How the model file is placed in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    /// Number of layers to offload to the GPU (0 = CPU only).
    pub gpu_layers: i32,
    /// Load only the vocabulary, not the weights.
    pub vocabulary_only: bool,
    pub use_memory_mapping: bool,
    /// Pin model memory so the OS cannot page it out.
    pub lock_in_ram: bool,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            gpu_layers: 0,
            vocabulary_only: false,
            use_memory_mapping: true,
            lock_in_ram: false,
        }
    }
}

/// Runtime context (KV window) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParameters {
    /// Context window in tokens (n_ctx).
    pub context_size: usize,
    pub thread_count: usize,
    /// Upper bound on tokens submitted per decode call (n_batch).
    pub batch_size: usize,
}

impl Default for ContextParameters {
    fn default() -> Self {
        Self {
            context_size: 4096,
            thread_count: num_cpus::get_physical().max(1),
            batch_size: 512,
        }
    }
}

/// Knobs for turning one step's logits into a committed token.
///
/// Disabled states: `top_k == 0` (or >= vocab size), `top_p == 1.0`,
/// `repeat_penalty == 1.0`, `frequency_penalty == 0.0`, `presence_penalty == 0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParameters {
    pub max_tokens: usize,
    /// <= 1e-5 selects greedily.
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Recent tokens the penalties apply to (oldest first).
    pub penalty_window: Vec<Token>,
    /// When > 0, generated tokens are appended to the window and only the
    /// last `penalty_last_n` entries are kept.
    pub penalty_last_n: usize,
    /// Fixed seed: the RNG is reseeded at the start of every call.
    pub seed: Option<u64>,
}

impl Default for SamplingParameters {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.8,
            top_k: 45,
            top_p: 0.95,
            repeat_penalty: 1.1,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            penalty_window: Vec::new(),
            penalty_last_n: 0,
            seed: None,
        }
    }
}

impl SamplingParameters {
    /// Argmax decoding with every filter and penalty disabled.
    pub fn greedy(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
            top_k: 0,
            top_p: 1.0,
            repeat_penalty: 1.0,
            ..Self::default()
        }
    }

    /// True when no penalty would change any score.
    #[inline]
    pub fn penalties_disabled(&self) -> bool {
        self.repeat_penalty == 1.0 && self.frequency_penalty == 0.0 && self.presence_penalty == 0.0
    }
}
