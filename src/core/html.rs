//! Markup extraction over rendered card text.
//!
//! Card templates wrap the actual question in boilerplate: a `<style>` block
//! up front and `<hr>`-delimited answer sections behind it. Everything here is
//! a pure transform over one markup string; nothing is cached and nothing
//! panics on layouts we have never seen.

use std::sync::OnceLock;

use html5ever::{
    namespace_url,
    ns,
    parse_fragment,
    serialize::{
        serialize,
        SerializeOpts,
        TraversalScope,
    },
    tendril::TendrilSink,
    LocalName,
    ParseOpts,
    QualName,
};
use markup5ever_rcdom::{
    Handle,
    NodeData,
    RcDom,
    SerializableHandle,
};
use regex::Regex;

use super::text::strip_spaces_before_punctuation;

/// The question region of a card: its flattened plain text (prompt input) and
/// the serialized markup fragment (for the "Original Question" reveal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRegion {
    pub text: String,
    pub html: String,
}

fn parse_markup(markup: &str) -> RcDom {
    parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, ns!(html), LocalName::from("body")),
        Vec::new(),
    )
    .one(markup)
}

/// Top-level nodes of a parsed fragment (children of the synthetic root).
fn fragment_nodes(dom: &RcDom) -> Vec<Handle> {
    dom.document
        .children
        .borrow()
        .first()
        .map(|root| root.children.borrow().clone())
        .unwrap_or_default()
}

fn is_element(node: &Handle, tag: &str) -> bool {
    match &node.data {
        NodeData::Element { name, .. } => name.local.as_ref() == tag,
        _ => false,
    }
}

fn attr_value(node: &Handle, attr: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref() == attr)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// First element with the given tag, depth-first.
fn find_first(nodes: &[Handle], tag: &str) -> Option<Handle> {
    for node in nodes {
        if is_element(node, tag) {
            return Some(node.clone());
        }
        if let Some(found) = find_first(&node.children.borrow(), tag) {
            return Some(found);
        }
    }
    None
}

/// Siblings following the first element with the given tag, within its parent.
fn following_siblings(nodes: &[Handle], tag: &str) -> Option<Vec<Handle>> {
    for (i, node) in nodes.iter().enumerate() {
        if is_element(node, tag) {
            return Some(nodes[i + 1..].to_vec());
        }
        if let Some(found) = following_siblings(&node.children.borrow(), tag) {
            return Some(found);
        }
    }
    None
}

fn serialize_nodes(nodes: &[Handle]) -> String {
    let mut output = Vec::new();
    let opts = SerializeOpts { traversal_scope: TraversalScope::IncludeNode, ..Default::default() };
    for node in nodes {
        let serializable = SerializableHandle::from(node.clone());
        // The sink is a Vec; serialization into it cannot fail meaningfully.
        let _ = serialize(&mut output, &serializable, opts.clone());
    }
    String::from_utf8(output).unwrap_or_default()
}

/// Isolate the question region of a card: every sibling between the template's
/// `<style>` block and the first `<hr>`. Returns `None` when the markup has no
/// style anchor or the region is blank, in which case the caller falls back to
/// reading the note field directly.
pub fn extract_question(markup: &str) -> Option<QuestionRegion> {
    let dom = parse_markup(markup);
    let nodes = fragment_nodes(&dom);
    let siblings = following_siblings(&nodes, "style")?;

    let mut region = Vec::new();
    for node in siblings {
        if is_element(&node, "hr") {
            break;
        }
        region.push(node);
    }

    let html = serialize_nodes(&region);
    let text = strip_tags(&html);
    if text.trim().is_empty() {
        return None;
    }
    Some(QuestionRegion { text, html })
}

/// The template's `<style>` element, serialized, so a spliced card keeps its
/// original look.
pub fn style_block(markup: &str) -> Option<String> {
    let dom = parse_markup(markup);
    let nodes = fragment_nodes(&dom);
    let style = find_first(&nodes, "style")?;
    Some(serialize_nodes(&[style]))
}

/// The answer region: the `<hr id="answer">` marker (or the first `<hr>` when
/// the template left it unmarked) through to the next `<hr>`. When no marker
/// exists a labeled placeholder is synthesized; this never fails.
pub fn answer_region(markup: &str) -> String {
    let dom = parse_markup(markup);
    let nodes = fragment_nodes(&dom);
    let siblings = following_siblings(&nodes, "style").unwrap_or(nodes);

    let marker = siblings
        .iter()
        .position(|n| is_element(n, "hr") && attr_value(n, "id").as_deref() == Some("answer"))
        .or_else(|| siblings.iter().position(|n| is_element(n, "hr")));

    match marker {
        Some(start) => {
            let mut region = vec![siblings[start].clone()];
            for node in &siblings[start + 1..] {
                if is_element(node, "hr") {
                    break;
                }
                region.push(node.clone());
            }
            serialize_nodes(&region)
        }
        None => format!(
            "<hr id=\"answer\"><p>[{}] Failed to extract original answer.</p>",
            super::TUTOR_TAG
        ),
    }
}

/// Flatten markup to plain text: `<br>` becomes a newline, style/script
/// subtrees are dropped, text nodes are trimmed and joined with single spaces.
pub fn strip_tags(html: &str) -> String {
    static BR: OnceLock<Regex> = OnceLock::new();
    let br = BR.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
    let html = br.replace_all(html, "\n");

    let dom = parse_markup(&html);
    let nodes = fragment_nodes(&dom);
    let mut chunks: Vec<String> = Vec::new();
    collect_text(&nodes, &mut chunks);
    strip_spaces_before_punctuation(&chunks.join(" "))
}

fn collect_text(nodes: &[Handle], chunks: &mut Vec<String>) {
    for node in nodes {
        match &node.data {
            NodeData::Element { name, .. }
                if matches!(name.local.as_ref(), "style" | "script") => {}
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            }
            _ => collect_text(&node.children.borrow(), chunks),
        }
    }
}

/// Wrap generated text in a display paragraph, one `<br>` per line break.
pub fn paragraph_from_text(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    format!("<p>{}</p>", lines.join("<br>"))
}

/// Ordinal of the deletion under review, read from the
/// `<span class="cloze" data-ordinal="N">` the scheduler renders for it.
pub fn active_cloze_ordinal(markup: &str) -> Option<u32> {
    let dom = parse_markup(markup);
    let nodes = fragment_nodes(&dom);
    find_cloze_span(&nodes)
}

fn find_cloze_span(nodes: &[Handle]) -> Option<u32> {
    for node in nodes {
        if is_element(node, "span") {
            let classes = attr_value(node, "class").unwrap_or_default();
            if classes.split_whitespace().any(|c| c == "cloze") {
                if let Some(ordinal) =
                    attr_value(node, "data-ordinal").and_then(|v| v.parse().ok())
                {
                    return Some(ordinal);
                }
            }
        }
        if let Some(ordinal) = find_cloze_span(&node.children.borrow()) {
            return Some(ordinal);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = "<style>.card { font-family: arial; }</style>\
What is the powerhouse of the cell?\
<hr id=\"answer\">The mitochondria.";

    #[test]
    fn test_extract_question() {
        let region = extract_question(CARD).expect("question region");
        assert_eq!(region.text, "What is the powerhouse of the cell?");
        assert_eq!(region.html, "What is the powerhouse of the cell?");

        // Markup without a style anchor has no extractable region.
        assert!(extract_question("<p>No style block here</p>").is_none());
        // Neither does a card whose question sits somewhere else entirely.
        assert!(extract_question("<style>.card {}</style><hr>Answer only").is_none());
    }

    #[test]
    fn test_extract_question_keeps_markup() {
        let markup = "<style>.card {}</style><div>Name <b>two</b> gases</div><hr>O2, N2";
        let region = extract_question(markup).unwrap();
        assert_eq!(region.text, "Name two gases");
        assert_eq!(region.html, "<div>Name <b>two</b> gases</div>");
    }

    #[test]
    fn test_answer_region() {
        let answer = answer_region(CARD);
        assert!(answer.starts_with("<hr id=\"answer\">"));
        assert!(answer.contains("The mitochondria."));

        // Unmarked templates fall back to the first <hr>.
        let unmarked = answer_region("<style></style>Q<hr>A<hr>Extra");
        assert!(unmarked.contains('A'));
        assert!(!unmarked.contains("Extra"));

        // No answer at all: a labeled placeholder, never a panic.
        let missing = answer_region("<style></style>Question only");
        assert!(missing.contains("Failed to extract original answer."));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>bold</b> and <i>italic</i>"), "bold and italic");
        assert_eq!(strip_tags("line one<br>line two"), "line one\nline two");
        assert_eq!(strip_tags("<style>.card {}</style>visible"), "visible");
        assert_eq!(strip_tags("spaced <b>out</b> ."), "spaced out.");
    }

    #[test]
    fn test_paragraph_from_text() {
        assert_eq!(paragraph_from_text("one line"), "<p>one line</p>");
        assert_eq!(paragraph_from_text("two\nlines"), "<p>two<br>lines</p>");
    }

    #[test]
    fn test_active_cloze_ordinal() {
        let markup = "<style></style>The <span class=\"cloze\" data-ordinal=\"2\">[...]</span> rises";
        assert_eq!(active_cloze_ordinal(markup), Some(2));
        assert_eq!(active_cloze_ordinal("<p>no cloze span</p>"), None);

        // Inactive spans do not mark the reviewed deletion.
        let inactive = "<span class=\"cloze-inactive\" data-ordinal=\"1\">text</span>";
        assert_eq!(active_cloze_ordinal(inactive), None);
    }
}
