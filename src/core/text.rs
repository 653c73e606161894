use std::sync::OnceLock;

use regex::Regex;

/// Collapse whitespace runs left behind by tag stripping so `word .` reads as
/// `word.` again.
pub fn strip_spaces_before_punctuation(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"\s([?.!"](?:\s|$))"#).unwrap());
    re.replace_all(text, "$1").to_string()
}

/// Trim a single pair of matching outer quotes; models often wrap their whole
/// reply in them.
pub fn trim_outer_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
