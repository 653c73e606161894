use async_trait::async_trait;
use thiserror::Error;

pub mod open_ai;

pub use open_ai::OpenAi;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Network(Box<reqwest::Error>),

    #[error("authentication rejected")]
    Auth,

    #[error("rate limited")]
    RateLimited,

    #[error("completion API returned HTTP {0}")]
    Api(u16),

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        ProviderError::Network(Box::new(error))
    }
}

/// A model backend that rewrites a prompt into replacement text.
///
/// The display pipeline treats any failure as "no usable rephrasing"; provider
/// errors never propagate past the generation boundary.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn completion(&self, prompt: &str) -> Result<String, ProviderError>;
}
