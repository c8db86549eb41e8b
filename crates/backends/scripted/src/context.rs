use std::sync::Arc;

use parley_abi::{Batch, DecodeContext, EngineError, Release, Token};

use crate::ledger::{Ledger, ResourceEvent};
use crate::script::{Reply, Script};
use crate::vocab::ScriptedVocab;

/// Score given to the scripted next token; everything else scores 0.
const PEAK: f32 = 30.0;

/// KV-context stand-in. Tracks `n_past` exactly like a real context would and
/// rejects batches that skip, rewind or overrun positions.
#[derive(Debug)]
pub struct ScriptedContext {
    id: u32,
    vocab: Arc<ScriptedVocab>,
    capacity: usize,
    n_past: usize,
    script: Script,
    ledger: Ledger,
    reply: Vec<Token>,
    served: usize,
}

impl ScriptedContext {
    pub(crate) fn new(
        id: u32,
        vocab: Arc<ScriptedVocab>,
        capacity: usize,
        script: Script,
        ledger: Ledger,
    ) -> Self {
        ledger.record(ResourceEvent::ContextCreated(id));
        Self {
            id,
            vocab,
            capacity,
            n_past: 0,
            script,
            ledger,
            reply: Vec::new(),
            served: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Positions currently held in the (simulated) KV cache.
    pub fn n_past(&self) -> usize {
        self.n_past
    }

    fn validate(&self, batch: &Batch) -> Result<(), EngineError> {
        let Some(first) = batch.first_position() else {
            return Err(EngineError::InvalidBatch("empty batch".into()));
        };
        if first != self.n_past {
            return Err(EngineError::InvalidBatch(format!(
                "batch starts at position {first}, expected {}",
                self.n_past
            )));
        }
        let last = first + batch.len() - 1;
        if last >= self.capacity {
            return Err(EngineError::ContextOverflow {
                position: last,
                capacity: self.capacity,
            });
        }
        if let Some(bad) = batch.tokens().iter().find(|t| !self.vocab.contains(**t)) {
            return Err(EngineError::InvalidBatch(format!(
                "token {} outside vocabulary",
                bad.0
            )));
        }
        Ok(())
    }

    fn next_row(&mut self) -> Vec<f32> {
        let width = self.script.logits_width().unwrap_or(self.vocab.len());
        let mut row = vec![0.0; width];
        let next = self
            .reply
            .get(self.served)
            .copied()
            .unwrap_or(self.vocab.eos());
        self.served += 1;
        if let Some(slot) = next.index().and_then(|i| row.get_mut(i)) {
            *slot = PEAK;
        }
        row
    }
}

impl DecodeContext for ScriptedContext {
    fn decode(&mut self, batch: &Batch) -> Result<Vec<Vec<f32>>, EngineError> {
        if self.script.begin_decode() {
            return Err(EngineError::Decode("scripted decode failure".into()));
        }
        self.validate(batch)?;

        // A fresh sequence starts a fresh reply.
        if batch.first_position() == Some(0) {
            self.reply = match self.script.next_reply() {
                Some(Reply::Text(text)) => self.vocab.tokenize(&text, false, true),
                Some(Reply::Tokens(tokens)) => tokens,
                None => Vec::new(),
            };
            self.served = 0;
        }
        self.n_past += batch.len();

        let n_out = batch.n_outputs();
        tracing::trace!(id = self.id, n_tokens = batch.len(), n_out, n_past = self.n_past, "scripted decode");
        Ok((0..n_out).map(|_| self.next_row()).collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear_cache(&mut self) {
        self.n_past = 0;
    }
}

impl Release for ScriptedContext {
    fn release(&mut self) {
        tracing::trace!(id = self.id, "scripted context released");
        self.ledger.record(ResourceEvent::ContextReleased(self.id));
    }
}
