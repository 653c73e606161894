use serde::{
    Deserialize,
    Serialize,
};

use crate::core::prompts::PromptTemplates;

/// How many upcoming cards the orchestrator pre-warms per display event. Small
/// on purpose: it bounds concurrent completion calls.
pub const REPHRASE_CARDS_AHEAD: usize = 2;

/// Review-maturity floor a card must clear before its wording is hidden: the
/// learner keeps seeing the literal text until the concept has settled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaturityThresholds {
    /// Minimum ease factor, in permille (2500 = 250%).
    pub min_ease: u32,
    pub min_interval_days: f32,
    pub min_reviews: u32,
}

impl Default for MaturityThresholds {
    fn default() -> Self {
        Self { min_ease: 2000, min_interval_days: 7.0, min_reviews: 3 }
    }
}

/// Everything the host's configuration screen feeds the tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    pub api_key: String,
    pub model: String,
    pub display_original_question: bool,
    pub rephrase_cards_ahead: usize,
    pub thresholds: MaturityThresholds,
    pub prompts: PromptTemplates,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            display_original_question: true,
            rephrase_cards_ahead: REPHRASE_CARDS_AHEAD,
            thresholds: MaturityThresholds::default(),
            prompts: PromptTemplates::default(),
        }
    }
}
