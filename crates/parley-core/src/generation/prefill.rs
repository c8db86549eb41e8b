use tracing::{debug, trace};

use parley_abi::{Batch, EngineError, InferenceEngine};

use super::GenerationLoop;
use crate::error::{Result, SessionError};
use crate::format::format::FormattedPrompt;

pub(super) enum Ingested {
    /// Logits for the last prompt position; `cursor` is the next free position.
    Ready { logits: Vec<f32>, cursor: usize },
    /// The prompt alone does not fit; nothing was decoded.
    Overflowed { prompt_tokens: usize },
}

impl GenerationLoop {
    /// Tokenize the prompt and submit it in `batch_size` chunks from position 0,
    /// with logits requested only for the final position.
    pub(super) fn ingest<E: InferenceEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        prompt: &FormattedPrompt,
    ) -> Result<Ingested> {
        if prompt.is_empty() {
            return Err(SessionError::Template("prompt is empty".into()));
        }
        let tokens = prompt.tokenize(&*engine)?;
        let capacity = engine.context_capacity();
        debug!(prompt_tokens = tokens.len(), capacity, "prompt tokenized");

        if tokens.is_empty() {
            return Err(SessionError::Template(
                "prompt tokenized to nothing".into(),
            ));
        }
        if tokens.len() > capacity {
            debug!(
                prompt_tokens = tokens.len(),
                capacity, "prompt does not fit the context window"
            );
            return Ok(Ingested::Overflowed {
                prompt_tokens: tokens.len(),
            });
        }

        // Full history is re-encoded on every call.
        engine.clear_cache();

        let mut batch = Batch::new(self.batch_size.min(tokens.len()));
        let mut cursor = 0usize;
        let n_chunks = tokens.len().div_ceil(self.batch_size);
        let mut last_rows = Vec::new();

        for (i, chunk) in tokens.chunks(self.batch_size).enumerate() {
            batch.clear();
            for &t in chunk {
                batch.add(t, cursor, false);
                cursor += 1;
            }
            if i + 1 == n_chunks {
                batch.mark_last_for_logits();
            }
            trace!(chunk = i, len = chunk.len(), first = ?batch.first_position(), "prefill chunk");
            last_rows = engine.decode_batch(&batch)?;
        }

        let logits = last_rows
            .pop()
            .ok_or_else(|| EngineError::Decode("no logits for final prompt position".into()))?;
        debug!(cursor, "prompt ingested");
        Ok(Ingested::Ready { logits, cursor })
    }
}
