//! Plain-text cleanup shared by the feed fetcher and the article extractor.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements that never contribute visible article text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "button", "input", "select", "textarea",
    "nav", "header", "footer", "aside",
];

/// Markers that start the boilerplate footer of most Korean news bodies.
/// Everything from the first marker onward is dropped.
const FOOTER_MARKERS: &[&str] = &[
    "무단전재",
    "무단 전재",
    "저작권자 ©",
    "저작권자(c)",
    "저작권자ⓒ",
    "Copyright ©",
    "Copyright(c)",
    "ⓒ 연합뉴스",
];

/// Decoration prefixes Korean outlets use for related-links blocks.
const DECORATIONS: &[char] = &['▶', '◀', '※', '☞', '■', '▲', '●'];

/// Collapses runs of whitespace into single spaces and trims.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drops zero-width and BOM characters that survive HTML extraction.
pub fn strip_zero_width(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{2060}'))
        .collect()
}

/// Renders an HTML fragment to its visible text. Entities are decoded by the
/// parser; script and style subtrees are skipped.
pub fn strip_html(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    visible_text_of(document.root_element(), &[])
}

/// Collects the visible text under `element`, skipping non-content tags and
/// any element whose class or id matches one of `skip_patterns`
/// (case-insensitive substring match).
pub fn visible_text_of(element: ElementRef<'_>, skip_patterns: &[&str]) -> String {
    let mut out = String::new();
    collect_text(*element, skip_patterns, &mut out);
    normalize_whitespace(&out)
}

fn collect_text(node: NodeRef<'_, Node>, skip_patterns: &[&str], out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) => {
                if SKIP_TAGS.contains(&el.name()) {
                    continue;
                }
                if !skip_patterns.is_empty() {
                    let class_attr = el.attr("class").unwrap_or("");
                    let id_attr = el.attr("id").unwrap_or("");
                    if !class_attr.is_empty() || !id_attr.is_empty() {
                        let haystack =
                            format!("{} {}", class_attr, id_attr).to_ascii_lowercase();
                        if skip_patterns.iter().any(|p| haystack.contains(p)) {
                            continue;
                        }
                    }
                }
                collect_text(child, skip_patterns, out);
            }
            _ => {}
        }
    }
}

/// Cleans an extracted Korean article body: boilerplate footer, reporter
/// emails, decoration characters, whitespace.
pub fn clean_article_text(text: &str) -> String {
    let mut text = strip_zero_width(text);

    for marker in FOOTER_MARKERS {
        if let Some(idx) = text.find(marker) {
            text.truncate(idx);
        }
    }

    let cleaned: String = text
        .split_whitespace()
        .filter(|token| !token.contains('@'))
        .collect::<Vec<_>>()
        .join(" ");

    let cleaned: String = cleaned.chars().filter(|c| !DECORATIONS.contains(c)).collect();
    normalize_whitespace(&cleaned)
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}
