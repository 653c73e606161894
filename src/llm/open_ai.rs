use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    StatusCode,
};
use serde::Deserialize;

use super::{
    LlmProvider,
    ProviderError,
};
use crate::core::RewordError;

const BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAi {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, RewordError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RewordError::Custom(format!("HTTP client build failed: {e}")))?;
        Ok(Self { client, api_key: api_key.into(), model: model.into() })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Configuration-time check: does the key open the models endpoint?
    pub async fn check_api_key(&self) -> bool {
        match self
            .client
            .get(format!("{BASE_URL}/models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                eprintln!("OpenAI API key check failed: {err}");
                false
            }
        }
    }

    /// Configuration-time check: is the configured model id served?
    pub async fn check_model(&self) -> bool {
        match self
            .client
            .get(format!("{BASE_URL}/models/{}", self.model))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                eprintln!("OpenAI model check failed: {err}");
                false
            }
        }
    }

    /// Model ids the account can use, for the error report when the configured
    /// one is rejected.
    pub async fn valid_models(&self) -> Result<Vec<String>, RewordError> {
        let response = self
            .client
            .get(format!("{BASE_URL}/models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ProviderError::from)?;
        let list: ModelList = response.json().await.map_err(ProviderError::from)?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl LlmProvider for OpenAi {
    async fn completion(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{BASE_URL}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(ProviderError::Auth),
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
            status if !status.is_success() => return Err(ProviderError::Api(status.as_u16())),
            _ => {}
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::MalformedResponse(e.to_string())
            } else {
                ProviderError::from(e)
            }
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in reply".to_string()))?;
        Ok(choice.message.content)
    }
}
