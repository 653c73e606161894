use thiserror::Error;

use crate::{
    anki::NoteId,
    llm::ProviderError,
};

#[derive(Error, Debug)]
pub enum RewordError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("Completion provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("AnkiConnect error: {0}")]
    Api(String),

    #[error("Note {0} has no \"{1}\" field")]
    MissingField(NoteId, String),

    #[error("RewordError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for RewordError {
    fn from(error: std::io::Error) -> Self {
        RewordError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for RewordError {
    fn from(error: reqwest::Error) -> Self {
        RewordError::Reqwest(Box::new(error))
    }
}
