//! Conversation-related types.

use chatline_model::Turn;

/// The ordered turns exchanged with the model, oldest first.
///
/// Only the session mutates a transcript. Callers outside this crate see
/// snapshots returned by [`crate::ChatSession::history`].
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub(crate) struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    #[inline]
    pub(crate) fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[inline]
    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    #[inline]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }
}
