//! Splicing for the basic front/back note kinds.
//!
//! A reversed note renders the same markup machinery in either direction, so
//! the only extra work is deciding whether the markup is currently asking the
//! front or the back.

use super::{
    required_field,
    NoteKind,
    ReviewEvent,
    WrappedNote,
};
use crate::core::{
    html,
    RewordError,
    TUTOR_TAG,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Front,
    Back,
}

/// Which of two field texts the target markup is showing: both substrings are
/// looked up by first occurrence and the earlier one wins; if only one is
/// found it wins; if neither is found the back wins; on an index tie the
/// longer string wins (one may be a prefix of the other).
pub(crate) fn question_side(target: &str, front: &str, back: &str) -> Side {
    match (target.find(front), target.find(back)) {
        (None, _) => Side::Back,
        (_, None) => Side::Front,
        (Some(f), Some(b)) if f < b => Side::Front,
        (Some(f), Some(b)) if f > b => Side::Back,
        _ => {
            if front.len() >= back.len() {
                Side::Front
            } else {
                Side::Back
            }
        }
    }
}

impl WrappedNote {
    pub(crate) async fn splice_basic(
        &self,
        markup: &str,
        event: ReviewEvent,
    ) -> Result<String, RewordError> {
        let note = self.host().note_info(self.note_id()).await?;
        let region = html::extract_question(markup);

        let (rephrased_question, question_html) = match self.kind() {
            NoteKind::Basic => {
                let front_raw = required_field(&note, "Front")?;
                let Some(artifact) = self.artifacts().front else {
                    return Ok(markup.to_string());
                };
                let question_html =
                    region.as_ref().map(|r| r.html.clone()).unwrap_or(front_raw);
                (artifact.rephrased, question_html)
            }
            NoteKind::BasicAndReversed => {
                let front_raw = required_field(&note, "Front")?;
                let back_raw = required_field(&note, "Back")?;
                let front_text = html::strip_tags(&front_raw);
                let back_text = html::strip_tags(&back_raw);
                // Without a clean region the whole markup still contains the
                // question text somewhere; match against that.
                let question_text = region
                    .as_ref()
                    .map(|r| r.text.clone())
                    .unwrap_or_else(|| html::strip_tags(markup));

                let artifacts = self.artifacts();
                let (artifact, raw) = match question_side(&question_text, &front_text, &back_text)
                {
                    Side::Front => (artifacts.front, front_raw),
                    Side::Back => (artifacts.back, back_raw),
                };
                let Some(artifact) = artifact else {
                    return Ok(markup.to_string());
                };
                let question_html = region.as_ref().map(|r| r.html.clone()).unwrap_or(raw);
                (artifact.rephrased, question_html)
            }
            _ => return Ok(markup.to_string()),
        };

        let mut out = String::new();
        if let Some(style) = html::style_block(markup) {
            out.push_str(&style);
        }
        out.push_str(&html::paragraph_from_text(&rephrased_question));

        if event == ReviewEvent::Answer {
            out.push_str(&html::answer_region(markup));
            if self.displays_original() {
                out.push_str(&format!(
                    "<hr id=\"original-question\"><p><b>[{TUTOR_TAG}] Original Question</b></p>"
                ));
                out.push_str(&question_html);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        anki::MemoryCollection,
        core::prompts::PromptTemplates,
        notes::{
            tests::{
                note,
                FakeProvider,
            },
            NoteWrapperFactory,
        },
    };

    #[test]
    fn test_question_side_prefers_earlier_occurrence() {
        assert_eq!(question_side("capital of France? Paris", "capital of France?", "Paris"), Side::Front);
        assert_eq!(question_side("Paris ... capital of France?", "capital of France?", "Paris"), Side::Back);
    }

    #[test]
    fn test_question_side_single_match_wins() {
        assert_eq!(question_side("X", "X", "XY"), Side::Front);
        assert_eq!(question_side("only the back here", "front text", "back"), Side::Back);
    }

    #[test]
    fn test_question_side_defaults_to_back() {
        assert_eq!(question_side("neither appears", "front", "back?"), Side::Back);
    }

    #[test]
    fn test_question_side_tie_prefers_longer() {
        // Back contains the front as a prefix and both match at index zero.
        assert_eq!(question_side("XY and more", "X", "XY"), Side::Back);
        assert_eq!(question_side("same", "same", "same"), Side::Front);
    }

    #[tokio::test]
    async fn test_reversed_note_rephrases_both_sides() {
        let collection = Arc::new(MemoryCollection::new());
        collection.insert_note(note(
            2,
            "Basic (and reversed card)",
            &[("Front", "gato"), ("Back", "the cat")],
        ));
        let factory = NoteWrapperFactory::new(collection);
        let provider = FakeProvider::replying("reworded");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(2, None).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();

        // One completion per direction.
        assert_eq!(provider.call_count(), 2);
        let artifacts = wrapped.artifacts();
        assert_eq!(artifacts.front.unwrap().source, "gato");
        assert_eq!(artifacts.back.unwrap().source, "the cat");
    }

    #[tokio::test]
    async fn test_reversed_splice_picks_the_shown_side() {
        let collection = Arc::new(MemoryCollection::new());
        collection.insert_note(note(
            2,
            "Basic (and reversed card)",
            &[("Front", "gato"), ("Back", "the cat")],
        ));
        let factory = NoteWrapperFactory::new(collection);
        let provider = FakeProvider::replying("reworded");
        let prompts = PromptTemplates::default();

        let wrapped = factory.wrapped_note(2, None).await.unwrap();
        wrapped.rephrase(&provider, &prompts).await.unwrap();
        // Make the two sides distinguishable after the shared fake reply.
        let mut artifacts = wrapped.artifacts();
        artifacts.front.as_mut().unwrap().rephrased = "reworded front".to_string();
        artifacts.back.as_mut().unwrap().rephrased = "reworded back".to_string();
        wrapped.restore_artifacts(artifacts);

        // The reversed card shows the back as its question.
        let markup = "<style></style>the cat<hr id=\"answer\">gato";
        let question = wrapped.rephrase_text(markup, ReviewEvent::Question).await.unwrap();
        assert!(question.contains("reworded back"));
        assert!(!question.contains("reworded front"));

        let answer = wrapped.rephrase_text(markup, ReviewEvent::Answer).await.unwrap();
        assert!(answer.contains("reworded back"));
        assert!(answer.contains("gato"));
        assert!(answer.contains("Original Question"));
        assert!(answer.contains("the cat"));
    }
}
