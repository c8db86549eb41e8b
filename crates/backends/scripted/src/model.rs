use std::sync::Arc;

use parley_abi::{EngineError, Release, Token, Vocabulary};

use crate::ledger::{Ledger, ResourceEvent};
use crate::vocab::ScriptedVocab;

#[derive(Debug)]
pub struct ScriptedModel {
    id: u32,
    vocab: Arc<ScriptedVocab>,
    ledger: Ledger,
}

impl ScriptedModel {
    pub(crate) fn new(id: u32, vocab: Arc<ScriptedVocab>, ledger: Ledger) -> Self {
        ledger.record(ResourceEvent::ModelLoaded(id));
        Self { id, vocab, ledger }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn vocab(&self) -> Arc<ScriptedVocab> {
        self.vocab.clone()
    }
}

impl Vocabulary for ScriptedModel {
    fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        parse_special: bool,
    ) -> Result<Vec<Token>, EngineError> {
        Ok(self.vocab.tokenize(text, add_special, parse_special))
    }

    fn token_piece(&self, token: Token) -> Result<Vec<u8>, EngineError> {
        self.vocab.piece(token)
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn eos_token(&self) -> Token {
        self.vocab.eos()
    }
}

impl Release for ScriptedModel {
    fn release(&mut self) {
        tracing::trace!(id = self.id, "scripted model released");
        self.ledger.record(ResourceEvent::ModelReleased(self.id));
    }
}
