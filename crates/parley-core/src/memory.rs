//! Per-session conversation history.

use parley_abi::{ChatTurn, Role};

/// Ordered chat turns, oldest first. Append-only apart from `clear` and the
/// system slot at index 0.
#[derive(Default, Debug, Clone)]
pub struct ConversationState {
    turns: Vec<ChatTurn>,
}

impl ConversationState {
    #[inline]
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    #[inline]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn push_user<S: Into<String>>(&mut self, s: S) {
        self.turns.push(ChatTurn::user(s));
    }

    #[inline]
    pub fn push_assistant<S: Into<String>>(&mut self, s: S) {
        self.turns.push(ChatTurn::assistant(s));
    }

    /// Replace the system turn at index 0, or insert one there.
    /// Later turns are kept.
    pub fn set_system<S: Into<String>>(&mut self, s: S) {
        let turn = ChatTurn::system(s);
        match self.turns.first_mut() {
            Some(first) if first.role == Role::System => *first = turn,
            _ => self.turns.insert(0, turn),
        }
    }

    pub fn system(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
    }

    /// Remove all history, system turn included.
    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
