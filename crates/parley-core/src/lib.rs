//! Parley core: conversational sessions over an autoregressive inference engine.
//!
//! - [`sampling`]: logits + parameters -> one token.
//! - [`generation`]: prompt ingest and the token-by-token decode loop.
//! - [`format`]: chat templates, segmented prompts, control-marker filtering.
//! - [`session`]: staged initialization, history, `submit`.

pub mod config;
pub mod error;
pub mod format;
pub mod generation;
pub mod memory;
pub mod sampling;
pub mod session;

pub use config::{SessionConfig, Validate};
pub use error::{Result, SessionError};
pub use format::format::{FormattedPrompt, Segment};
pub use format::prompt_format::{TemplateKind, select_template};
pub use format::prompting::{ChatMlTemplate, ChatTemplate, Llama3Template};
pub use format::stream_filter::StreamFilter;
pub use generation::{Generation, GenerationLoop, LoopState, StopReason};
pub use memory::ConversationState;
pub use sampling::{SamplingError, SamplingPipeline};
pub use session::{ConversationSession, EngineHandle};

pub use parley_abi;
