use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

pub type NoteId = u64;
pub type CardId = u64;

/// Live snapshot of a note's editable content. Never cached by the engine;
/// the note can change between any two reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteInfo {
    pub note_id: NoteId,
    pub model_name: String,
    pub fields: HashMap<String, String>,
    pub cards: Vec<CardId>,
}

impl NoteInfo {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Scheduler queue a card currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardQueue {
    New,
    Learning,
    Review,
    DayLearning,
    Suspended,
    Buried,
}

impl CardQueue {
    /// Scheduler queue codes: 0 new, 1 learning, 2 review, 3 day (re)learning,
    /// 4 preview, -1 suspended, -2/-3 buried.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => CardQueue::New,
            1 | 4 => CardQueue::Learning,
            2 => CardQueue::Review,
            3 => CardQueue::DayLearning,
            -1 => CardQueue::Suspended,
            _ => CardQueue::Buried,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, CardQueue::New)
    }
}

/// Review-maturity attributes of a card; read-only inputs to the eligibility
/// policy, never computed here.
#[derive(Debug, Clone, PartialEq)]
pub struct CardInfo {
    pub card_id: CardId,
    pub note_id: NoteId,
    /// Ease factor in permille (2500 = 250%).
    pub ease_factor: u32,
    /// Interval in days; learning cards come in as fractional days.
    pub interval_days: f32,
    pub reps: u32,
    pub queue: CardQueue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_codes() {
        assert_eq!(CardQueue::from_code(0), CardQueue::New);
        assert_eq!(CardQueue::from_code(2), CardQueue::Review);
        assert_eq!(CardQueue::from_code(-1), CardQueue::Suspended);
        assert_eq!(CardQueue::from_code(-2), CardQueue::Buried);
        assert!(CardQueue::from_code(0).is_new());
        assert!(!CardQueue::from_code(2).is_new());
    }
}
