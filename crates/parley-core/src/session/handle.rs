use parley_abi::{
    Backend, Batch, DecodeContext, EngineError, InferenceEngine, Scoped, Token, Vocabulary,
};

/// A loaded model and its context, owned together.
///
/// Fields drop in declaration order, so the context is released before the
/// model it was created from.
pub struct EngineHandle<B: Backend> {
    context: Scoped<B::Context>,
    model: Scoped<B::Model>,
    end_of_turn: Token,
    batch_size: usize,
}

impl<B: Backend> EngineHandle<B> {
    pub fn new(
        model: Scoped<B::Model>,
        context: Scoped<B::Context>,
        end_of_turn: Token,
        batch_size: usize,
    ) -> Self {
        Self {
            context,
            model,
            end_of_turn,
            batch_size,
        }
    }

    pub fn end_of_turn(&self) -> Token {
        self.end_of_turn
    }

    pub(crate) fn set_end_of_turn(&mut self, token: Token) {
        self.end_of_turn = token;
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn model(&self) -> &B::Model {
        &self.model
    }

    /// Give the model back, releasing the context.
    pub(crate) fn into_model(self) -> Scoped<B::Model> {
        let Self { context, model, .. } = self;
        drop(context);
        model
    }
}

impl<B: Backend> InferenceEngine for EngineHandle<B> {
    fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        parse_special: bool,
    ) -> Result<Vec<Token>, EngineError> {
        self.model.tokenize(text, add_special, parse_special)
    }

    fn detokenize_one(&self, token: Token) -> Result<Vec<u8>, EngineError> {
        self.model.token_piece(token)
    }

    fn decode_batch(&mut self, batch: &Batch) -> Result<Vec<Vec<f32>>, EngineError> {
        self.context.decode(batch)
    }

    fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    fn eos_token(&self) -> Token {
        self.model.eos_token()
    }

    fn context_capacity(&self) -> usize {
        self.context.capacity()
    }

    fn clear_cache(&mut self) {
        self.context.clear_cache();
    }
}
