//! Per-note rephrasing state.
//!
//! Each note the reviewer touches gets one [`WrappedNote`], resolved through
//! the [`NoteWrapperFactory`] and kept for the life of the process so cached
//! rephrasings survive repeated display events. A cached rephrasing stays
//! valid only while the live extracted source text still equals the snapshot
//! it was generated from; edits invalidate it lazily on the next check.

use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
    },
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    anki::{
        Collection,
        NoteId,
        NoteInfo,
    },
    core::{
        html,
        prompts::PromptTemplates,
        text::trim_outer_quotes,
        RewordError,
        TUTOR_TAG,
    },
    llm::LlmProvider,
};

pub mod basic;
pub mod cloze;
pub mod cloze_parser;

/// Template kinds the engine knows how to rephrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    Basic,
    BasicAndReversed,
    Cloze,
    PassThrough,
}

impl NoteKind {
    /// Case-insensitive mapping from the note type's template name. Unknown
    /// templates pass through untouched.
    pub fn classify(model_name: &str) -> Self {
        match model_name.to_lowercase().as_str() {
            "basic" => NoteKind::Basic,
            "basic (and reversed card)" => NoteKind::BasicAndReversed,
            "cloze" => NoteKind::Cloze,
            _ => NoteKind::PassThrough,
        }
    }
}

/// Which side of the review the host is about to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Question,
    Answer,
}

impl ReviewEvent {
    /// Hook kinds as the reviewer reports them.
    pub fn from_hook_kind(kind: &str) -> Option<Self> {
        match kind {
            "reviewQuestion" | "previewQuestion" | "clayoutQuestion" => Some(ReviewEvent::Question),
            "reviewAnswer" | "previewAnswer" | "clayoutAnswer" => Some(ReviewEvent::Answer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RephraseState {
    Idle,
    InProgress,
    Complete,
}

/// A generated rephrasing plus the exact source text it was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub rephrased: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub front: Option<Artifact>,
    pub back: Option<Artifact>,
    pub cloze: Option<Artifact>,
}

/// Extracted plain source texts for one note, per its kind. These are exactly
/// the strings prompts are built from and snapshots are compared against.
enum Sources {
    PassThrough,
    Basic { front: String },
    Reversed { front: String, back: String },
    Cloze { cloze: String },
}

pub(crate) fn required_field(note: &NoteInfo, name: &str) -> Result<String, RewordError> {
    note.field(name)
        .map(str::to_string)
        .ok_or_else(|| RewordError::MissingField(note.note_id, name.to_string()))
}

fn matches_source(artifact: &Option<Artifact>, source: &str) -> bool {
    artifact.as_ref().is_some_and(|a| a.source == source)
}

/// Ask the provider for a replacement, degrading to a labeled fallback when
/// the call fails or comes back empty. Display text is never empty.
pub(crate) async fn generate_rephrased(
    provider: &dyn LlmProvider,
    prompt: &str,
    original: &str,
    part: &str,
) -> String {
    let raw = match provider.completion(prompt).await {
        Ok(text) => text,
        Err(err) => {
            eprintln!("[{TUTOR_TAG}] completion failed: {err}");
            String::new()
        }
    };
    let trimmed = trim_outer_quotes(raw.trim()).to_string();
    if trimmed.is_empty() {
        format!("{original}<br><br><b>[{TUTOR_TAG}]</b> Failed to rephrase {part} due to ambiguity.")
    } else {
        trimmed
    }
}

/// One note as the reviewer sees it: its kind, its cached rephrasings, and
/// the gate that keeps generations serialized.
pub struct WrappedNote {
    note_id: NoteId,
    kind: NoteKind,
    display_original_question: AtomicBool,
    host: Arc<dyn Collection>,
    gate: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    artifacts: Mutex<ArtifactSet>,
}

impl WrappedNote {
    fn new(
        note_id: NoteId,
        kind: NoteKind,
        display_original_question: bool,
        host: Arc<dyn Collection>,
    ) -> Self {
        Self {
            note_id,
            kind,
            display_original_question: AtomicBool::new(display_original_question),
            host,
            gate: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            artifacts: Mutex::new(ArtifactSet::default()),
        }
    }

    pub fn note_id(&self) -> NoteId {
        self.note_id
    }

    pub fn kind(&self) -> NoteKind {
        self.kind
    }

    pub(crate) fn host(&self) -> &dyn Collection {
        self.host.as_ref()
    }

    pub fn displays_original(&self) -> bool {
        self.display_original_question.load(Ordering::Acquire)
    }

    pub fn set_display_original_question(&self, value: bool) {
        self.display_original_question.store(value, Ordering::Release);
    }

    pub fn artifacts(&self) -> ArtifactSet {
        self.artifacts.lock().unwrap().clone()
    }

    pub fn restore_artifacts(&self, artifacts: ArtifactSet) {
        *self.artifacts.lock().unwrap() = artifacts;
    }

    /// True while a generation call is in flight for this note.
    pub fn is_rephrasing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait for any in-flight generation to settle. No result beyond
    /// "now settled".
    pub async fn wait_for_rephrasing(&self) {
        drop(self.gate.lock().await);
    }

    pub async fn state(&self) -> RephraseState {
        if self.is_rephrasing() {
            return RephraseState::InProgress;
        }
        match self.is_rephrased().await {
            Ok(true) => RephraseState::Complete,
            _ => RephraseState::Idle,
        }
    }

    /// Whether the cached rephrasing is still valid against the live note
    /// content. Pass-through notes always are.
    pub async fn is_rephrased(&self) -> Result<bool, RewordError> {
        if self.kind == NoteKind::PassThrough {
            return Ok(true);
        }
        let sources = self.sources().await?;
        Ok(self.is_valid_against(&sources))
    }

    async fn sources(&self) -> Result<Sources, RewordError> {
        let note = self.host.note_info(self.note_id).await?;
        Ok(match self.kind {
            NoteKind::PassThrough => Sources::PassThrough,
            NoteKind::Basic => {
                Sources::Basic { front: html::strip_tags(&required_field(&note, "Front")?) }
            }
            NoteKind::BasicAndReversed => Sources::Reversed {
                front: html::strip_tags(&required_field(&note, "Front")?),
                back: html::strip_tags(&required_field(&note, "Back")?),
            },
            NoteKind::Cloze => {
                Sources::Cloze { cloze: html::strip_tags(&required_field(&note, "Text")?) }
            }
        })
    }

    fn is_valid_against(&self, sources: &Sources) -> bool {
        let artifacts = self.artifacts.lock().unwrap();
        match sources {
            Sources::PassThrough => true,
            Sources::Basic { front } => matches_source(&artifacts.front, front),
            Sources::Reversed { front, back } => {
                matches_source(&artifacts.front, front) && matches_source(&artifacts.back, back)
            }
            Sources::Cloze { cloze } => matches_source(&artifacts.cloze, cloze),
        }
    }

    /// Bring the cached rephrasing up to date. Concurrent callers coalesce on
    /// the per-note gate: whoever wins generates, everyone else waits and then
    /// finds the cache valid. At most one generation is ever in flight per
    /// note.
    pub async fn rephrase(
        &self,
        provider: &dyn LlmProvider,
        prompts: &PromptTemplates,
    ) -> Result<(), RewordError> {
        if self.kind == NoteKind::PassThrough {
            return Ok(());
        }

        let _guard = self.gate.lock().await;
        let sources = self.sources().await?;
        if self.is_valid_against(&sources) {
            return Ok(());
        }

        self.in_flight.store(true, Ordering::Release);
        self.generate(&sources, provider, prompts).await;
        self.in_flight.store(false, Ordering::Release);
        Ok(())
    }

    /// Regenerate whichever parts are stale. Stores a degraded fallback on
    /// provider failure, so after this the cache is valid either way.
    async fn generate(
        &self,
        sources: &Sources,
        provider: &dyn LlmProvider,
        prompts: &PromptTemplates,
    ) {
        match sources {
            Sources::PassThrough => {}
            Sources::Basic { front } => {
                if !matches_source(&self.artifacts.lock().unwrap().front, front) {
                    let rephrased = generate_rephrased(
                        provider,
                        &prompts.render_front(front),
                        front,
                        "note front",
                    )
                    .await;
                    self.artifacts.lock().unwrap().front =
                        Some(Artifact { rephrased, source: front.clone() });
                }
            }
            Sources::Reversed { front, back } => {
                if !matches_source(&self.artifacts.lock().unwrap().front, front) {
                    let rephrased = generate_rephrased(
                        provider,
                        &prompts.render_front(front),
                        front,
                        "note front",
                    )
                    .await;
                    self.artifacts.lock().unwrap().front =
                        Some(Artifact { rephrased, source: front.clone() });
                }
                if !matches_source(&self.artifacts.lock().unwrap().back, back) {
                    let rephrased =
                        generate_rephrased(provider, &prompts.render_back(back), back, "note back")
                            .await;
                    self.artifacts.lock().unwrap().back =
                        Some(Artifact { rephrased, source: back.clone() });
                }
            }
            Sources::Cloze { cloze } => {
                if !matches_source(&self.artifacts.lock().unwrap().cloze, cloze) {
                    let rephrased =
                        cloze::generate_rephrased_cloze(provider, prompts, cloze).await;
                    self.artifacts.lock().unwrap().cloze =
                        Some(Artifact { rephrased, source: cloze.clone() });
                }
            }
        }
    }

    /// Splice the cached rephrasing into display markup for the given event.
    /// Pass-through notes return the markup unchanged, as does any note whose
    /// artifacts have not landed yet.
    pub async fn rephrase_text(
        &self,
        markup: &str,
        event: ReviewEvent,
    ) -> Result<String, RewordError> {
        match self.kind {
            NoteKind::PassThrough => Ok(markup.to_string()),
            NoteKind::Basic | NoteKind::BasicAndReversed => self.splice_basic(markup, event).await,
            NoteKind::Cloze => self.splice_cloze(markup, event).await,
        }
    }
}

/// Serializable image of every note's cached artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub notes: HashMap<NoteId, SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: NoteKind,
    pub artifacts: ArtifactSet,
}

/// Resolves notes to their wrappers and owns the process-wide wrapper cache.
/// There is deliberately no eviction: a review session touches at most a few
/// thousand notes and each wrapper is small.
pub struct NoteWrapperFactory {
    host: Arc<dyn Collection>,
    wrappers: Mutex<HashMap<NoteId, Arc<WrappedNote>>>,
}

impl NoteWrapperFactory {
    pub fn new(host: Arc<dyn Collection>) -> Self {
        Self { host, wrappers: Mutex::new(HashMap::new()) }
    }

    /// Resolve the wrapper for a note, classifying it on first sight. Repeat
    /// lookups update the display toggle in place and never construct a
    /// duplicate, so cached artifacts survive across display events.
    pub async fn wrapped_note(
        &self,
        note_id: NoteId,
        display_original_question: Option<bool>,
    ) -> Result<Arc<WrappedNote>, RewordError> {
        if let Some(wrapped) = self.wrappers.lock().unwrap().get(&note_id).cloned() {
            if let Some(display) = display_original_question {
                wrapped.set_display_original_question(display);
            }
            return Ok(wrapped);
        }

        let note = self.host.note_info(note_id).await?;
        let kind = NoteKind::classify(&note.model_name);
        let wrapped = Arc::new(WrappedNote::new(
            note_id,
            kind,
            display_original_question.unwrap_or(true),
            self.host.clone(),
        ));

        // A concurrent resolve may have raced us; the first insert wins so
        // artifacts never split across two instances.
        let mut wrappers = self.wrappers.lock().unwrap();
        Ok(wrappers.entry(note_id).or_insert(wrapped).clone())
    }

    /// Drop every wrapper, e.g. when the host closes or syncs the profile.
    pub fn reset(&self) {
        self.wrappers.lock().unwrap().clear();
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let wrappers = self.wrappers.lock().unwrap();
        CacheSnapshot {
            notes: wrappers
                .iter()
                .map(|(id, wrapped)| {
                    (*id, SnapshotEntry { kind: wrapped.kind(), artifacts: wrapped.artifacts() })
                })
                .collect(),
        }
    }

    /// Recreate wrappers from a persisted snapshot. Restored artifacts still
    /// go through the usual staleness check before they are trusted.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        let mut wrappers = self.wrappers.lock().unwrap();
        for (note_id, entry) in snapshot.notes {
            let wrapped =
                Arc::new(WrappedNote::new(note_id, entry.kind, true, self.host.clone()));
            wrapped.restore_artifacts(entry.artifacts);
            wrappers.insert(note_id, wrapped);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::{
        anki::{
            CardInfo,
            CardQueue,
            MemoryCollection,
        },
        llm::ProviderError,
    };

    /// Counts completions and replies with a fixed string, after an optional
    /// delay so tests can overlap calls.
    pub(crate) struct FakeProvider {
        pub calls: AtomicUsize,
        pub reply: String,
        pub delay: Duration,
    }

    impl FakeProvider {
        pub fn replying(reply: &str) -> Self {
            Self { calls: AtomicUsize::new(0), reply: reply.to_string(), delay: Duration::ZERO }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        async fn completion(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            Ok(self.reply.clone())
        }
    }

    pub(crate) fn note(id: NoteId, model: &str, fields: &[(&str, &str)]) -> NoteInfo {
        NoteInfo {
            note_id: id,
            model_name: model.to_string(),
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            cards: vec![id * 10],
        }
    }

    pub(crate) fn review_card(card_id: u64, note_id: NoteId) -> CardInfo {
        CardInfo {
            card_id,
            note_id,
            ease_factor: 2500,
            interval_days: 30.0,
            reps: 12,
            queue: CardQueue::Review,
        }
    }

    fn collection_with_basic_note() -> Arc<MemoryCollection> {
        let collection = Arc::new(MemoryCollection::new());
        collection.insert_note(note(
            1,
            "Basic",
            &[("Front", "What is the capital of France?"), ("Back", "Paris")],
        ));
        collection
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(NoteKind::classify("Basic"), NoteKind::Basic);
        assert_eq!(NoteKind::classify("BASIC (And Reversed Card)"), NoteKind::BasicAndReversed);
        assert_eq!(NoteKind::classify("Cloze"), NoteKind::Cloze);
        assert_eq!(NoteKind::classify("Image Occlusion"), NoteKind::PassThrough);
    }

    #[tokio::test]
    async fn test_rephrase_is_cached_while_content_unchanged() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection);
        let provider = FakeProvider::replying("Which city is France governed from?");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert!(wrapped.is_rephrased().await.unwrap());
        assert_eq!(wrapped.state().await, RephraseState::Complete);
    }

    #[tokio::test]
    async fn test_edit_invalidates_and_regenerates() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection.clone());
        let provider = FakeProvider::replying("rephrased");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();
        assert!(wrapped.is_rephrased().await.unwrap());

        collection.set_field(1, "Front", "What is the capital of Spain?");
        assert!(!wrapped.is_rephrased().await.unwrap());
        assert_eq!(wrapped.state().await, RephraseState::Idle);

        wrapped.rephrase(&provider, &prompts).await.unwrap();
        assert_eq!(provider.call_count(), 2);
        let artifact = wrapped.artifacts().front.unwrap();
        assert_eq!(artifact.source, "What is the capital of Spain?");
    }

    #[tokio::test]
    async fn test_concurrent_rephrasing_coalesces() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection);
        let provider = Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            reply: "slow reply".to_string(),
            delay: Duration::from_millis(50),
        });
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let wrapped = wrapped.clone();
                let provider = provider.clone();
                let prompts = prompts.clone();
                tokio::spawn(async move { wrapped.rephrase(provider.as_ref(), &prompts).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(provider.call_count(), 1);
        assert_eq!(wrapped.artifacts().front.unwrap().rephrased, "slow reply");
    }

    #[tokio::test]
    async fn test_in_flight_generation_is_observable() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection);
        let provider = Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
            reply: "done".to_string(),
            delay: Duration::from_millis(50),
        });

        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        assert_eq!(wrapped.state().await, RephraseState::Idle);

        let task = {
            let wrapped = wrapped.clone();
            let provider = provider.clone();
            tokio::spawn(async move {
                wrapped.rephrase(provider.as_ref(), &PromptTemplates::default()).await
            })
        };
        sleep(Duration::from_millis(10)).await;
        assert!(wrapped.is_rephrasing());
        assert_eq!(wrapped.state().await, RephraseState::InProgress);

        wrapped.wait_for_rephrasing().await;
        assert!(!wrapped.is_rephrasing());
        assert_eq!(wrapped.state().await, RephraseState::Complete);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_reply_degrades_to_labeled_fallback() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection);
        let provider = FakeProvider::replying("");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();

        let artifact = wrapped.artifacts().front.unwrap();
        assert!(artifact.rephrased.starts_with("What is the capital of France?"));
        assert!(artifact.rephrased.contains("Failed to rephrase"));
        // Degraded or not, the note now counts as rephrased.
        assert!(wrapped.is_rephrased().await.unwrap());
    }

    #[tokio::test]
    async fn test_provider_error_degrades_to_labeled_fallback() {
        struct FailingProvider;

        #[async_trait]
        impl LlmProvider for FailingProvider {
            async fn completion(&self, _prompt: &str) -> Result<String, ProviderError> {
                Err(ProviderError::RateLimited)
            }
        }

        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection);
        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        wrapped.rephrase(&FailingProvider, &PromptTemplates::default()).await.unwrap();

        let artifact = wrapped.artifacts().front.unwrap();
        assert!(artifact.rephrased.contains("Failed to rephrase"));
    }

    #[tokio::test]
    async fn test_pass_through_never_touches_provider() {
        let collection = Arc::new(MemoryCollection::new());
        collection.insert_note(note(9, "Image Occlusion", &[("Occlusion", "…")]));
        let factory = NoteWrapperFactory::new(collection);
        let provider = FakeProvider::replying("should never be used");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(9, None).await.unwrap();
        assert_eq!(wrapped.kind(), NoteKind::PassThrough);
        assert!(wrapped.is_rephrased().await.unwrap());

        wrapped.rephrase(&provider, &prompts).await.unwrap();
        assert_eq!(provider.call_count(), 0);

        let markup = "<style></style>whatever the template rendered";
        let out = wrapped.rephrase_text(markup, ReviewEvent::Question).await.unwrap();
        assert_eq!(out, markup);
    }

    #[tokio::test]
    async fn test_factory_memoizes_by_note_id() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection);

        let first = factory.wrapped_note(1, Some(true)).await.unwrap();
        let second = factory.wrapped_note(1, Some(false)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // The repeat resolution updated the toggle on the shared instance.
        assert!(!first.displays_original());
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let collection = collection_with_basic_note();
        let factory = NoteWrapperFactory::new(collection.clone());
        let provider = FakeProvider::replying("round trip");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(1, None).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();

        let snapshot = factory.snapshot();
        let restored_factory = NoteWrapperFactory::new(collection);
        restored_factory.restore(snapshot);

        let restored = restored_factory.wrapped_note(1, None).await.unwrap();
        assert_eq!(restored.artifacts().front.unwrap().rephrased, "round trip");
        // Still valid: the note content has not moved since the snapshot.
        assert!(restored.is_rephrased().await.unwrap());
    }
}
