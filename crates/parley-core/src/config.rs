//! Session configuration: JSON documents, env overrides and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_abi::{ContextParameters, ModelParameters, SamplingParameters};

use crate::error::{Result, SessionError};
use crate::format::prompt_format::TemplateKind;

/// Clamps `sampling.max_tokens` (usize).
pub const ENV_MAX_DECODE_TOKENS: &str = "PARLEY_MAX_DECODE_TOKENS";
/// Sets `sampling.seed` (u64).
pub const ENV_SEED: &str = "PARLEY_SEED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub model_path: PathBuf,
    pub model: ModelParameters,
    pub context: ContextParameters,
    pub sampling: SamplingParameters,
    pub system_prompt: Option<String>,
    pub template: TemplateKind,
}

impl SessionConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| SessionError::Configuration(format!("invalid session config: {e}")))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SessionError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `PARLEY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|k| std::env::var(k).ok())
    }

    /// Apply overrides from any key lookup. Unparsable values are rejected.
    pub fn apply_overrides_from<L>(&mut self, lookup: L) -> Result<()>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MAX_DECODE_TOKENS) {
            let cap = parse_override::<usize>(ENV_MAX_DECODE_TOKENS, &v)?;
            self.sampling.max_tokens = self.sampling.max_tokens.min(cap.max(1));
            debug!(max_tokens = self.sampling.max_tokens, "max_tokens clamped from env");
        }
        if let Some(v) = lookup(ENV_SEED) {
            let seed = parse_override::<u64>(ENV_SEED, &v)?;
            self.sampling.seed = Some(seed);
            debug!(seed, "seed set from env");
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        SessionError::Configuration(format!("{key}={value:?} is not a valid value"))
    })
}

/// Range checks for parameter structs.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(msg: impl Into<String>) -> SessionError {
    SessionError::Configuration(msg.into())
}

impl Validate for ModelParameters {
    fn validate(&self) -> Result<()> {
        if self.gpu_layers < 0 {
            return Err(invalid(format!("gpu_layers must be >= 0, got {}", self.gpu_layers)));
        }
        Ok(())
    }
}

impl Validate for ContextParameters {
    fn validate(&self) -> Result<()> {
        if self.context_size == 0 {
            return Err(invalid("context_size must be > 0"));
        }
        if self.thread_count == 0 {
            return Err(invalid("thread_count must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be > 0"));
        }
        Ok(())
    }
}

impl Validate for SamplingParameters {
    fn validate(&self) -> Result<()> {
        let finite = [
            ("temperature", self.temperature),
            ("top_p", self.top_p),
            ("repeat_penalty", self.repeat_penalty),
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ];
        if let Some((name, v)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!("{name} must be finite, got {v}")));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid(format!("top_p must be in [0, 1], got {}", self.top_p)));
        }
        if self.repeat_penalty <= 0.0 {
            return Err(invalid(format!(
                "repeat_penalty must be > 0, got {}",
                self.repeat_penalty
            )));
        }
        Ok(())
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.context.validate()?;
        self.sampling.validate()
    }
}
