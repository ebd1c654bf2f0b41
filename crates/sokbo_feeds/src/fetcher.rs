use std::sync::Arc;
use std::time::Duration;

use feed_rs::parser;
use tracing::{debug, warn};
use url::Url;

use sokbo_core::{Error, FeedEntry, FeedSource, HttpClient};

use crate::charset;
use crate::text;

const SNIPPET_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Ok,
    NetworkError(String),
    HttpError(u16),
    ParseError(String),
    Timeout,
    CharsetUnresolvable,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Ok)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Ok => "ok",
            FetchOutcome::NetworkError(_) => "network_error",
            FetchOutcome::HttpError(_) => "http_error",
            FetchOutcome::ParseError(_) => "parse_error",
            FetchOutcome::Timeout => "timeout",
            FetchOutcome::CharsetUnresolvable => "charset_unresolvable",
        }
    }

    pub fn message(&self) -> String {
        match self {
            FetchOutcome::Ok => "ok".to_string(),
            FetchOutcome::NetworkError(msg) => msg.clone(),
            FetchOutcome::HttpError(status) => format!("server responded with status {}", status),
            FetchOutcome::ParseError(msg) => msg.clone(),
            FetchOutcome::Timeout => "feed fetch exceeded its deadline".to_string(),
            FetchOutcome::CharsetUnresolvable => {
                "no charset candidate produced a readable document".to_string()
            }
        }
    }
}

/// Downloads and parses one RSS/Atom feed. Failures are outcomes, never
/// errors; a bad feed yields zero entries.
pub struct FeedFetcher {
    http: Arc<dyn HttpClient>,
}

impl FeedFetcher {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    pub async fn fetch(
        &self,
        source: &FeedSource,
        deadline: Duration,
    ) -> (Vec<FeedEntry>, FetchOutcome) {
        let response = match self.http.get(&source.rss_url, deadline).await {
            Ok(response) => response,
            Err(Error::Timeout(_)) => return (Vec::new(), FetchOutcome::Timeout),
            Err(e) => return (Vec::new(), FetchOutcome::NetworkError(e.to_string())),
        };
        if !(200..300).contains(&response.status) {
            return (Vec::new(), FetchOutcome::HttpError(response.status));
        }

        let candidates = charset::candidates(&response.body, response.content_type.as_deref());
        let mut clean_decode = false;
        let mut last_parse_error = String::new();
        for candidate in &candidates {
            if !candidate.had_errors {
                clean_decode = true;
            }
            match parser::parse(candidate.text.as_bytes()) {
                Ok(feed) => {
                    debug!(
                        source = %source.name,
                        charset = candidate.label,
                        entries = feed.entries.len(),
                        "parsed feed"
                    );
                    return (entries_from(feed, source), FetchOutcome::Ok);
                }
                Err(e) => last_parse_error = e.to_string(),
            }
        }

        if clean_decode {
            warn!(source = %source.name, error = %last_parse_error, "feed did not parse");
            (Vec::new(), FetchOutcome::ParseError(last_parse_error))
        } else {
            warn!(source = %source.name, "no charset candidate decoded cleanly");
            (Vec::new(), FetchOutcome::CharsetUnresolvable)
        }
    }
}

fn entries_from(feed: feed_rs::model::Feed, source: &FeedSource) -> Vec<FeedEntry> {
    let mut entries = Vec::new();
    for entry in feed.entries {
        let title = match entry.title {
            Some(t) => text::normalize_whitespace(&t.content),
            None => continue,
        };
        if title.is_empty() {
            continue;
        }
        let link = match entry
            .links
            .first()
            .and_then(|l| canonicalize_link(&l.href))
        {
            Some(link) => link,
            None => continue,
        };

        let snippet = entry
            .summary
            .map(|s| text::truncate_chars(&text::strip_html(&s.content), SNIPPET_CHARS))
            .filter(|s| !s.is_empty());

        entries.push(FeedEntry {
            title,
            link,
            published_at: entry.published.or(entry.updated),
            source: source.clone(),
            snippet,
        });
    }
    entries
}

/// Strips the fragment and normalizes the host (the url crate lowercases it
/// during parsing). Non-HTTP schemes are rejected.
pub fn canonicalize_link(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
