//! Cloze-deletion rendering and generation.
//!
//! The rephrased text keeps the source's `{{cN::…}}` markers (the prompt pins
//! that down, and [`generate_rephrased_cloze`] enforces it), so rendering only
//! has to swap markers for the reviewer's `cloze`/`cloze-inactive` spans.

use super::{
    cloze_parser,
    cloze_parser::Segment,
    generate_rephrased,
    ReviewEvent,
    WrappedNote,
};
use crate::{
    core::{
        html,
        prompts::PromptTemplates,
        RewordError,
        TUTOR_TAG,
    },
    llm::LlmProvider,
};

/// Render cloze text as a display paragraph. The group under review keeps the
/// `cloze` class; with `hide` set its text collapses to a bracketed
/// placeholder (the hint when one was authored, `...` otherwise). Other groups
/// render their text with the `cloze-inactive` class.
pub fn render_cloze(cloze: &str, active: u32, hide: bool) -> String {
    let segments = cloze_parser::parse(cloze);
    let mut out = String::from("<p>");
    render_segments(&segments, active, hide, &mut out);
    out.push_str("</p>");
    out
}

fn render_segments(segments: &[Segment], active: u32, hide: bool, out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Deletion(deletion) => {
                let is_active = deletion.ordinal == active;
                let class = if is_active { "cloze" } else { "cloze-inactive" };
                out.push_str(&format!(
                    "<span class=\"{}\" data-ordinal=\"{}\">",
                    class, deletion.ordinal
                ));
                if hide && is_active {
                    match &deletion.hint {
                        Some(hint) => out.push_str(&format!("[{hint}]")),
                        None => out.push_str("[...]"),
                    }
                } else {
                    render_segments(&deletion.children, active, hide, out);
                }
                out.push_str("</span>");
            }
        }
    }
}

/// Generate a rephrased cloze. The splice depends on deletion groups 1..N
/// surviving the rewrite, so a reply whose group set differs from the source's
/// is discarded in favor of the labeled fallback.
pub(crate) async fn generate_rephrased_cloze(
    provider: &dyn LlmProvider,
    prompts: &PromptTemplates,
    cloze: &str,
) -> String {
    let rephrased =
        generate_rephrased(provider, &prompts.render_cloze(cloze), cloze, "cloze").await;
    if cloze_parser::group_ordinals(&rephrased) != cloze_parser::group_ordinals(cloze) {
        eprintln!("[{TUTOR_TAG}] rephrased cloze lost deletion groups, keeping original text");
        return format!(
            "{cloze}<br><br><b>[{TUTOR_TAG}]</b> Failed to rephrase cloze due to ambiguity."
        );
    }
    rephrased
}

impl WrappedNote {
    pub(crate) async fn splice_cloze(
        &self,
        markup: &str,
        event: ReviewEvent,
    ) -> Result<String, RewordError> {
        let Some(artifact) = self.artifacts().cloze else {
            // No generation has landed yet; leave the card untouched.
            return Ok(markup.to_string());
        };

        let Some(active) = html::active_cloze_ordinal(markup) else {
            return Ok(format!(
                "{markup}<br><br><b>[{TUTOR_TAG}]</b> Failed to determine which cloze was deleted."
            ));
        };

        let hide = event == ReviewEvent::Question;
        let mut out = String::new();
        if let Some(style) = html::style_block(markup) {
            out.push_str(&style);
        }
        out.push_str(&render_cloze(&artifact.rephrased, active, hide));

        if event == ReviewEvent::Answer && self.displays_original() {
            out.push_str(&format!(
                "<hr id=\"original-cloze\"><p><b>[{TUTOR_TAG}] Original Cloze</b></p>"
            ));
            match html::extract_question(markup) {
                Some(region) => out.push_str(&region.html),
                // Markup held nothing usable; re-render the snapshot we
                // generated from instead.
                None => out.push_str(&render_cloze(&artifact.source, active, false)),
            }
        }
        Ok(out)
    }
}
