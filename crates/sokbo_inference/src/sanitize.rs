//! Query sanitation before anything reaches an LLM prompt.

use tracing::warn;

/// Role-override and injection phrases, matched case-insensitively. Matches
/// are stripped rather than rejected so the rest of the query survives.
const DENYLIST: &[&str] = &[
    "ignore previous instructions",
    "ignore previous instruction",
    "ignore all previous",
    "ignore previous",
    "ignore above",
    "forget previous",
    "forget all previous",
    "override previous",
    "disregard previous",
    "you are now",
    "act as",
    "pretend to be",
    "roleplay as",
    "reveal the system prompt",
    "system prompt",
    "system:",
    "assistant:",
    "user:",
    "[system]",
    "[assistant]",
    "[user]",
    "### instruction",
    "### system",
    "<script",
    "javascript:",
];

/// Characters with no business in a news query.
const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '\'', ';', '`', '\\', '\u{0}'];

const MAX_QUERY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizedQuery {
    /// Safe to place in an LLM prompt.
    Clean(String),
    /// Sanitation removed more than half the input or left fewer than two
    /// characters; only heuristic extraction may use the remainder.
    FallbackOnly(String),
}

/// Strips denylisted phrases and forbidden characters from a user query.
pub fn sanitize_query(query: &str) -> SanitizedQuery {
    let original_chars = query.trim().chars().count();

    let mut text = query.trim().to_string();
    for phrase in DENYLIST {
        text = remove_phrase(&text, phrase);
    }
    text.retain(|c| !FORBIDDEN_CHARS.contains(&c) && !c.is_control());
    let text: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let text: String = text.chars().take(MAX_QUERY_CHARS).collect();

    let kept = text.chars().count();
    if kept < 2 || kept * 2 < original_chars.min(MAX_QUERY_CHARS) {
        warn!(
            original = original_chars,
            kept, "sanitation stripped too much of the query"
        );
        return SanitizedQuery::FallbackOnly(text);
    }
    SanitizedQuery::Clean(text)
}

/// True when the text still carries any denylisted phrase.
pub fn contains_denylisted(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    DENYLIST.iter().any(|phrase| lower.contains(phrase))
}

/// Removes every case-insensitive occurrence of `phrase`. The denylist is
/// ASCII, so ASCII folding keeps byte offsets aligned with the original.
fn remove_phrase(text: &str, phrase: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let phrase_lower = phrase.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(rel) = lower[cursor..].find(&phrase_lower) {
        let start = cursor + rel;
        out.push_str(&text[cursor..start]);
        cursor = start + phrase_lower.len();
    }
    out.push_str(&text[cursor..]);
    out
}
