use sokbo_core::{FeedEntry, KeywordSet};

const TITLE_WEIGHT: u32 = 3;
const SNIPPET_WEIGHT: u32 = 1;

/// Ranks entries by keyword relevance and keeps the top `limit`. Entries
/// without a single hit are dropped. Ties go to the newer entry; entries
/// without a timestamp keep their input order.
pub fn rank_entries(entries: Vec<FeedEntry>, keywords: &KeywordSet, limit: usize) -> Vec<FeedEntry> {
    let mut scored: Vec<(usize, u32, FeedEntry)> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            let score = score_entry(&entry, keywords);
            if score == 0 {
                None
            } else {
                Some((idx, score, entry))
            }
        })
        .collect();

    scored.sort_by(|(a_idx, a_score, a), (b_idx, b_score, b)| {
        b_score
            .cmp(a_score)
            .then_with(|| match (b.published_at, a.published_at) {
                (Some(b_time), Some(a_time)) => b_time.cmp(&a_time),
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a_idx.cmp(b_idx))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(_, _, entry)| entry)
        .collect()
}

pub fn score_entry(entry: &FeedEntry, keywords: &KeywordSet) -> u32 {
    let title = entry.title.to_lowercase();
    let snippet = entry.snippet.as_deref().unwrap_or("").to_lowercase();
    keywords
        .terms
        .iter()
        .map(|term| {
            let term = term.to_lowercase();
            TITLE_WEIGHT * count_occurrences(&title, &term)
                + SNIPPET_WEIGHT * count_occurrences(&snippet, &term)
        })
        .sum()
}

fn count_occurrences(haystack: &str, needle: &str) -> u32 {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut cursor = 0;
    while let Some(rel) = haystack[cursor..].find(needle) {
        count += 1;
        cursor += rel + needle.len();
    }
    count
}
