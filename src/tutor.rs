//! Display-time coordinator: wires the host's review events to the
//! rephrasing engine and applies the eligibility policy.

use std::sync::{
    Arc,
    RwLock,
};

use futures::future::join_all;

use crate::{
    anki::{
        CardInfo,
        Collection,
    },
    core::{
        prompts::PromptTemplates,
        RewordError,
        TUTOR_TAG,
    },
    llm::{
        LlmProvider,
        OpenAi,
    },
    notes::{
        NoteWrapperFactory,
        ReviewEvent,
    },
    settings::{
        MaturityThresholds,
        TutorConfig,
    },
};

struct TutorSettings {
    display_original_question: bool,
    rephrase_cards_ahead: usize,
    thresholds: MaturityThresholds,
    prompts: PromptTemplates,
}

impl TutorSettings {
    fn from_config(config: &TutorConfig) -> Self {
        Self {
            display_original_question: config.display_original_question,
            rephrase_cards_ahead: config.rephrase_cards_ahead,
            thresholds: config.thresholds,
            prompts: config.prompts.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Tutor {
    host: Arc<dyn Collection>,
    factory: Arc<NoteWrapperFactory>,
    provider: Arc<RwLock<Arc<dyn LlmProvider>>>,
    settings: Arc<RwLock<TutorSettings>>,
}

impl Tutor {
    pub fn new(
        host: Arc<dyn Collection>,
        provider: Arc<dyn LlmProvider>,
        config: &TutorConfig,
    ) -> Self {
        Self {
            factory: Arc::new(NoteWrapperFactory::new(host.clone())),
            host,
            provider: Arc::new(RwLock::new(provider)),
            settings: Arc::new(RwLock::new(TutorSettings::from_config(config))),
        }
    }

    pub fn factory(&self) -> &NoteWrapperFactory {
        &self.factory
    }

    pub fn set_provider(&self, provider: Arc<dyn LlmProvider>) {
        *self.provider.write().unwrap() = provider;
    }

    pub fn set_display_original_question(&self, value: bool) {
        self.settings.write().unwrap().display_original_question = value;
    }

    /// Adopt new prompts/thresholds/toggles. Later generations pick up
    /// whatever is current; in-flight ones finish with what they started with.
    pub fn update_config(&self, config: &TutorConfig) {
        *self.settings.write().unwrap() = TutorSettings::from_config(config);
    }

    /// Validate and adopt a full configuration. Bad credentials and model ids
    /// are reported here, at apply time, never during a review.
    pub async fn apply_config(&self, config: &TutorConfig) -> Result<(), RewordError> {
        let provider = OpenAi::new(&config.api_key, &config.model)?;
        if !provider.check_api_key().await {
            return Err(RewordError::Custom(format!("[{TUTOR_TAG}] OpenAI API key is invalid.")));
        }
        if !provider.check_model().await {
            let listing = provider.valid_models().await.unwrap_or_default().join(", ");
            return Err(RewordError::Custom(format!(
                "[{TUTOR_TAG}] OpenAI model \"{}\" is invalid. Valid models: {}",
                config.model, listing
            )));
        }
        self.set_provider(Arc::new(provider));
        self.update_config(config);
        Ok(())
    }

    pub fn on_collection_load(&self) {
        self.spawn_prewarm();
    }

    /// The host is about to render a card. Returns the markup to show: the
    /// rephrased splice when the card is eligible, the input unchanged
    /// otherwise. Failures degrade to the input; this never blocks the review
    /// on an error.
    pub async fn on_card_will_show(
        &self,
        markup: &str,
        card: &CardInfo,
        event: ReviewEvent,
    ) -> String {
        self.spawn_prewarm();
        if !self.should_rephrase(card) {
            return markup.to_string();
        }
        match self.rephrased_markup(markup, card, event).await {
            Ok(text) => text,
            Err(err) => {
                eprintln!("[{TUTOR_TAG}] falling back to original card text: {err}");
                markup.to_string()
            }
        }
    }

    pub fn on_reviewer_did_show_answer(&self, _card: &CardInfo) {
        self.spawn_prewarm();
    }

    async fn rephrased_markup(
        &self,
        markup: &str,
        card: &CardInfo,
        event: ReviewEvent,
    ) -> Result<String, RewordError> {
        let display = self.settings.read().unwrap().display_original_question;
        let wrapped = self.factory.wrapped_note(card.note_id, Some(display)).await?;

        if !wrapped.is_rephrased().await? {
            let (provider, prompts) = self.generation_context();
            wrapped.rephrase(provider.as_ref(), &prompts).await?;
        }
        wrapped.rephrase_text(markup, event).await
    }

    /// A card is eligible once it has left the new queue and cleared every
    /// maturity floor; all four conditions are conjunctive.
    pub fn should_rephrase(&self, card: &CardInfo) -> bool {
        let thresholds = self.settings.read().unwrap().thresholds;
        !card.queue.is_new()
            && card.ease_factor >= thresholds.min_ease
            && card.interval_days >= thresholds.min_interval_days
            && card.reps >= thresholds.min_reviews
    }

    fn generation_context(&self) -> (Arc<dyn LlmProvider>, PromptTemplates) {
        let provider = self.provider.read().unwrap().clone();
        let prompts = self.settings.read().unwrap().prompts.clone();
        (provider, prompts)
    }

    /// Fire-and-forget pre-warm of the next queued cards so imminent reviews
    /// rarely wait on a live completion call. Failures are swallowed.
    fn spawn_prewarm(&self) {
        let tutor = self.clone();
        tokio::spawn(async move {
            if let Err(err) = tutor.prewarm_queue().await {
                eprintln!("[{TUTOR_TAG}] queue pre-warm failed: {err}");
            }
        });
    }

    async fn prewarm_queue(&self) -> Result<(), RewordError> {
        let lookahead = self.settings.read().unwrap().rephrase_cards_ahead;
        let cards = self.host.queued_cards(lookahead).await?;

        let tasks: Vec<_> = cards
            .into_iter()
            .filter(|card| self.should_rephrase(card))
            .map(|card| {
                let tutor = self.clone();
                tokio::spawn(async move {
                    if let Err(err) = tutor.prewarm_card(&card).await {
                        eprintln!(
                            "[{TUTOR_TAG}] pre-warm of note {} failed: {err}",
                            card.note_id
                        );
                    }
                })
            })
            .collect();
        join_all(tasks).await;
        Ok(())
    }

    async fn prewarm_card(&self, card: &CardInfo) -> Result<(), RewordError> {
        let display = self.settings.read().unwrap().display_original_question;
        let wrapped = self.factory.wrapped_note(card.note_id, Some(display)).await?;
        if wrapped.is_rephrased().await? {
            return Ok(());
        }
        let (provider, prompts) = self.generation_context();
        wrapped.rephrase(provider.as_ref(), &prompts).await
    }
}
