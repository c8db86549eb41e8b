// Owned decode batch, modelled on the llama.cpp `llama_batch` layout:
// parallel token/position/logits-flag columns over a single sequence.
//
// - Allocate once per generation call with the largest chunk size needed.
// - Reuse across decode steps with `clear()`.
// - Dropped (freed) on every exit path by ordinary ownership.

use crate::token::Token;

#[derive(Debug)]
pub struct Batch {
    tokens: Vec<Token>,
    positions: Vec<usize>,
    logits: Vec<bool>,
    capacity: usize,
}

impl Batch {
    /// Create a batch that holds at most `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            logits: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one token at absolute position `pos`.
    /// `logits = true` requests the distribution for this position.
    pub fn add(&mut self, token: Token, pos: usize, logits: bool) {
        assert!(
            self.tokens.len() < self.capacity,
            "batch full: capacity {}",
            self.capacity
        );
        if let Some(&last) = self.positions.last() {
            // Strictly sequential appends: no gaps inside one batch.
            assert!(
                pos == last + 1,
                "add() must be sequential: expected position {}, got {}",
                last + 1,
                pos
            );
        }
        self.tokens.push(token);
        self.positions.push(pos);
        self.logits.push(logits);
    }

    /// Ensure only the last token is marked for logits.
    pub fn mark_last_for_logits(&mut self) {
        let n = self.logits.len();
        for (i, flag) in self.logits.iter_mut().enumerate() {
            *flag = i + 1 == n;
        }
    }

    /// Reset so the buffer can be reused without reallocating.
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.positions.clear();
        self.logits.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    #[inline]
    pub fn logits_flags(&self) -> &[bool] {
        &self.logits
    }

    /// First position covered by this batch.
    #[inline]
    pub fn first_position(&self) -> Option<usize> {
        self.positions.first().copied()
    }

    /// Number of positions that asked for logits.
    pub fn n_outputs(&self) -> usize {
        self.logits.iter().filter(|&&f| f).count()
    }
}
