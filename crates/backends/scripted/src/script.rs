use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use parley_abi::Token;

/// One queued reply: text tokenized with control parsing, or raw token ids.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Tokens(Vec<Token>),
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<Reply>,
    fail_decode_at: Option<usize>,
    logits_width: Option<usize>,
    decode_calls: usize,
}

/// Shared, clonable reply script. Clones observe and mutate the same state.
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_reply<S: Into<String>>(&self, reply: S) {
        self.lock().replies.push_back(Reply::Text(reply.into()));
    }

    /// Queue a reply as raw token ids, e.g. byte tokens that do not form
    /// valid UTF-8 on their own.
    pub fn push_reply_tokens<I: IntoIterator<Item = Token>>(&self, tokens: I) {
        self.lock()
            .replies
            .push_back(Reply::Tokens(tokens.into_iter().collect()));
    }

    /// Make the decode call with this zero-based index (counted across the
    /// script's lifetime) fail.
    pub fn fail_decode_at(&self, call: usize) {
        self.lock().fail_decode_at = Some(call);
    }

    /// Emit logits rows of `width` entries instead of the vocabulary size.
    pub fn set_logits_width(&self, width: usize) {
        self.lock().logits_width = Some(width);
    }

    /// Decode calls served so far (including failed ones).
    pub fn decode_calls(&self) -> usize {
        self.lock().decode_calls
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }

    pub(crate) fn next_reply(&self) -> Option<Reply> {
        self.lock().replies.pop_front()
    }

    /// Count one decode call; returns true if it must fail.
    pub(crate) fn begin_decode(&self) -> bool {
        let mut s = self.lock();
        let call = s.decode_calls;
        s.decode_calls += 1;
        s.fail_decode_at == Some(call)
    }

    pub(crate) fn logits_width(&self) -> Option<usize> {
        self.lock().logits_width
    }
}
