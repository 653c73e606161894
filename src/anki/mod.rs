use async_trait::async_trait;

use crate::core::RewordError;

pub mod api;
pub mod memory;
pub mod types;

pub use api::AnkiConnect;
pub use memory::MemoryCollection;
pub use types::{
    CardId,
    CardInfo,
    CardQueue,
    NoteId,
    NoteInfo,
};

/// Read-only window onto the host collection. The engine never writes back.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Fresh field content for a note; called on every validity check.
    async fn note_info(&self, note_id: NoteId) -> Result<NoteInfo, RewordError>;

    async fn card_info(&self, card_id: CardId) -> Result<CardInfo, RewordError>;

    /// The next cards the scheduler will show, best-effort, capped at `limit`.
    async fn queued_cards(&self, limit: usize) -> Result<Vec<CardInfo>, RewordError>;
}
