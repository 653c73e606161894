use serde::{
    Deserialize,
    Serialize,
};

/// Substitution point every template must carry.
pub const NOTE_TEXT_SLOT: &str = "{note_text}";

const DEFAULT_FRONT_PROMPT: &str = "\
Given the flashcard front text: '{note_text}', please attempt to rephrase the card front \
in a way that retains the core information and intent but alters the structure and wording. \
This rephrasing should encourage understanding and recall of the concept rather than \
memorization of the card's wording style. If the text is too ambiguous to rephrase without \
altering its intended meaning, return an empty string without any further explanation of \
why the text is ambiguous.";

const DEFAULT_BACK_PROMPT: &str = "\
Given the flashcard back text: '{note_text}', please attempt to rephrase the card back \
in a way that retains the core information and intent but alters the structure and wording. \
This rephrasing should encourage understanding and recall of the concept rather than \
memorization of the card's wording style. If the text is too ambiguous to rephrase without \
altering its intended meaning, return an empty string without any further explanation of \
why the text is ambiguous.";

const DEFAULT_CLOZE_PROMPT: &str = "\
Given the cloze flashcard text: '{note_text}', please attempt to rephrase the surrounding \
text in a way that retains the core information and intent but alters the structure and \
wording. Keep every deletion marker of the form {{cN::text}} in the result, with the same \
deletion numbers and the same number of deletions, so the card still hides the same facts. \
If the text is too ambiguous to rephrase without altering its intended meaning, return an \
empty string without any further explanation of why the text is ambiguous.";

/// One prompt template per note kind, `{note_text}` as the substitution point.
/// Shared read-only by every wrapped note; a configuration reload swaps the
/// whole set and later generations pick up whatever is current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub front: String,
    pub back: String,
    pub cloze: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            front: DEFAULT_FRONT_PROMPT.to_string(),
            back: DEFAULT_BACK_PROMPT.to_string(),
            cloze: DEFAULT_CLOZE_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn render_front(&self, note_text: &str) -> String {
        Self::render(&self.front, note_text)
    }

    pub fn render_back(&self, note_text: &str) -> String {
        Self::render(&self.back, note_text)
    }

    pub fn render_cloze(&self, note_text: &str) -> String {
        Self::render(&self.cloze, note_text)
    }

    fn render(template: &str, note_text: &str) -> String {
        template.replace(NOTE_TEXT_SLOT, note_text)
    }
}
