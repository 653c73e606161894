use std::{
    collections::HashMap,
    sync::Mutex,
};

use async_trait::async_trait;

use super::{
    types::{
        CardId,
        CardInfo,
        NoteId,
        NoteInfo,
    },
    Collection,
};
use crate::core::RewordError;

/// In-memory [`Collection`] for tests and offline tooling: notes and cards in
/// hash maps, queued in insertion order.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    notes: HashMap<NoteId, NoteInfo>,
    cards: HashMap<CardId, CardInfo>,
    queue: Vec<CardId>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_note(&self, note: NoteInfo) {
        self.inner.lock().unwrap().notes.insert(note.note_id, note);
    }

    pub fn insert_card(&self, card: CardInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push(card.card_id);
        inner.cards.insert(card.card_id, card);
    }

    /// Overwrite one field of a stored note, as an edit in the host would.
    pub fn set_field(&self, note_id: NoteId, name: &str, value: &str) {
        if let Some(note) = self.inner.lock().unwrap().notes.get_mut(&note_id) {
            note.fields.insert(name.to_string(), value.to_string());
        }
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn note_info(&self, note_id: NoteId) -> Result<NoteInfo, RewordError> {
        self.inner
            .lock()
            .unwrap()
            .notes
            .get(&note_id)
            .cloned()
            .ok_or_else(|| RewordError::Custom(format!("note {note_id} not found")))
    }

    async fn card_info(&self, card_id: CardId) -> Result<CardInfo, RewordError> {
        self.inner
            .lock()
            .unwrap()
            .cards
            .get(&card_id)
            .cloned()
            .ok_or_else(|| RewordError::Custom(format!("card {card_id} not found")))
    }

    async fn queued_cards(&self, limit: usize) -> Result<Vec<CardInfo>, RewordError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.queue.iter().take(limit).filter_map(|id| inner.cards.get(id)).cloned().collect())
    }
}
