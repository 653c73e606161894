pub mod anki;
pub mod core;
pub mod llm;
pub mod notes;
pub mod persistence;
pub mod settings;
pub mod tutor;

pub use crate::core::RewordError;
pub use tutor::Tutor;
