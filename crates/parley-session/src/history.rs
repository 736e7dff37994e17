//! Bounded, ordered record of conversation turns.

use parley_types::{Content, Turn};
use serde::{Deserialize, Serialize};

/// Maximum number of stored turns: 10 user/model exchanges.
pub const MAX_HISTORY_TURNS: usize = 20;

/// Ordered turns of one session, oldest first.
///
/// `record_exchange` keeps the length at or below [`MAX_HISTORY_TURNS`] by
/// dropping the oldest turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Append a user turn and the model's reply, then enforce the bound.
    pub fn record_exchange(&mut self, user_text: impl Into<String>, model_text: impl Into<String>) {
        self.turns.push(Turn::user(user_text));
        self.turns.push(Turn::model(model_text));
        self.truncate_to(MAX_HISTORY_TURNS);
    }

    /// Keep only the newest `limit` turns.
    pub fn truncate_to(&mut self, limit: usize) {
        if self.turns.len() > limit {
            let excess = self.turns.len() - limit;
            self.turns.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Replay the stored turns as remote-model contents, in order.
    pub fn to_contents(&self) -> Vec<Content> {
        self.turns.iter().map(Content::from).collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

impl From<Vec<Turn>> for History {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}
