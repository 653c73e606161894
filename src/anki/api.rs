use std::{
    collections::HashMap,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::time::sleep;

use super::{
    types::{
        CardId,
        CardInfo,
        CardQueue,
        NoteId,
        NoteInfo,
    },
    Collection,
};
use crate::core::RewordError;

const DEFAULT_ENDPOINT: &str = "http://localhost:8765/";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Field {
    pub value: String,
    order: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    note_id: u64,
    pub fields: HashMap<String, Field>,
    pub model_name: String,
    pub cards: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub card_id: u64,
    note: u64,
    interval: i32,
    factor: u32,
    reps: u32,
    queue: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

/// AnkiConnect-backed [`Collection`]. Every accessor is one JSON action
/// against the local endpoint.
pub struct AnkiConnect {
    client: Client,
    endpoint: String,
}

impl Default for AnkiConnect {
    fn default() -> Self {
        Self::new()
    }
}

impl AnkiConnect {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self { client: Client::new(), endpoint: endpoint.into() }
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T, RewordError> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
        body.insert("version".to_string(), serde_json::Value::Number((6).into()));

        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }

        let response: ApiResponse<T> =
            self.client.post(&self.endpoint).json(&body).send().await?.json().await?;

        if let Some(error) = response.error {
            return Err(RewordError::Api(error));
        }
        response
            .result
            .ok_or_else(|| RewordError::Api(format!("empty result for action {action}")))
    }

    // Will just use to check if AnkiConnect is online
    pub async fn version(&self) -> Result<u32, RewordError> {
        self.request("version", None).await
    }

    pub async fn find_cards(&self, query: &str) -> Result<Vec<CardId>, RewordError> {
        let params = serde_json::json!({ "query": query });
        self.request("findCards", Some(params)).await
    }

    pub async fn notes_info(&self, note_ids: &[NoteId]) -> Result<Vec<NoteRecord>, RewordError> {
        let params = serde_json::json!({ "notes": note_ids });
        self.request("notesInfo", Some(params)).await
    }

    pub async fn cards_info(&self, card_ids: &[CardId]) -> Result<Vec<CardRecord>, RewordError> {
        let params = serde_json::json!({ "cards": card_ids });
        self.request("cardsInfo", Some(params)).await
    }
}

/// Retry the version probe until AnkiConnect answers or attempts run out.
pub async fn wait_awake(conn: &AnkiConnect, wait_time: u64, max_attempts: u32) -> bool {
    for attempt in 1..=max_attempts {
        match conn.version().await {
            Ok(version) => {
                println!("AnkiConnect is online. Version: {}", version);
                return true;
            }
            Err(err) => {
                println!(
                    "AnkiConnect attempt {} of {} failed. Retrying in {} seconds... Error: {}",
                    attempt, max_attempts, wait_time, err
                );
                if attempt < max_attempts {
                    sleep(Duration::from_secs(wait_time)).await;
                }
            }
        }
    }
    false
}

impl From<NoteRecord> for NoteInfo {
    fn from(record: NoteRecord) -> Self {
        NoteInfo {
            note_id: record.note_id,
            model_name: record.model_name,
            fields: record.fields.into_iter().map(|(name, field)| (name, field.value)).collect(),
            cards: record.cards,
        }
    }
}

impl From<CardRecord> for CardInfo {
    fn from(record: CardRecord) -> Self {
        // Negative intervals are in seconds (learning/relearning), positive in days
        let interval_days = if record.interval >= 0 {
            record.interval as f32
        } else {
            record.interval.abs() as f32 / 86400.0
        };

        CardInfo {
            card_id: record.card_id,
            note_id: record.note,
            ease_factor: record.factor,
            interval_days,
            reps: record.reps,
            queue: CardQueue::from_code(record.queue),
        }
    }
}

#[async_trait]
impl Collection for AnkiConnect {
    async fn note_info(&self, note_id: NoteId) -> Result<NoteInfo, RewordError> {
        self.notes_info(&[note_id])
            .await?
            .into_iter()
            .next()
            .map(NoteInfo::from)
            .ok_or_else(|| RewordError::Api(format!("note {note_id} not found")))
    }

    async fn card_info(&self, card_id: CardId) -> Result<CardInfo, RewordError> {
        self.cards_info(&[card_id])
            .await?
            .into_iter()
            .next()
            .map(CardInfo::from)
            .ok_or_else(|| RewordError::Api(format!("card {card_id} not found")))
    }

    async fn queued_cards(&self, limit: usize) -> Result<Vec<CardInfo>, RewordError> {
        let mut card_ids = self.find_cards("is:due").await?;
        card_ids.truncate(limit);
        if card_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.cards_info(&card_ids).await?.into_iter().map(CardInfo::from).collect())
    }
}
