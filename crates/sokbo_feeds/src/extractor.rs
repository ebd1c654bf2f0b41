use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::debug;

use sokbo_core::{Article, Clock, Error, FeedSource, HttpClient};

use crate::charset;
use crate::text;

const MIN_BODY_CHARS: usize = 100;

/// News-body containers tried in order after `<article>`. The front of the
/// list carries the ids and classes Korean outlets actually use.
const BODY_SELECTORS: &[&str] = &[
    "div#article-view-content-div",
    "div.article-text",
    "div#articleBodyContents",
    "div.article-text-area",
    "div.par",
    "div#news_body_id",
    "div.news_body",
    "div.article_body",
    "div#article_body",
    "div.story-news-article",
    "div#articleWrap",
    "div#articleText",
    "div.text_area",
    "div.article_area",
    "div.detail-body",
    "div.detail_content",
    "div.news_txt",
    "div.article_content",
    "div#articlebody",
    "div#newsEndContents",
    "div.view-content",
    "div.article-content",
    "div.news-content",
    "div.news_content",
    "div.post-content",
    "div.entry-content",
    "div.article-body",
    "div#articleBody",
    "div#content",
    "main",
];

/// Class/id substrings that mark non-editorial subtrees.
const AD_PATTERNS: &[&str] = &[
    "advert", "banner", "sponsor", "social", "share", "related", "comment", "sidebar",
    "breadcrumb", "subscribe", "copyright",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    NetworkError(String),
    HttpError(u16),
    Timeout,
    BodyTooShort(usize),
    Unparseable,
}

impl ExtractionFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionFailure::NetworkError(_) => "network_error",
            ExtractionFailure::HttpError(_) => "http_error",
            ExtractionFailure::Timeout => "timeout",
            ExtractionFailure::BodyTooShort(_) => "body_too_short",
            ExtractionFailure::Unparseable => "unparseable",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ExtractionFailure::NetworkError(msg) => msg.clone(),
            ExtractionFailure::HttpError(status) => {
                format!("server responded with status {}", status)
            }
            ExtractionFailure::Timeout => "article fetch exceeded its deadline".to_string(),
            ExtractionFailure::BodyTooShort(len) => {
                format!("extracted body has only {} characters", len)
            }
            ExtractionFailure::Unparseable => "document is not parseable HTML".to_string(),
        }
    }
}

/// Fetches an article page and extracts its title and plain-text body.
pub struct ArticleExtractor {
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl ArticleExtractor {
    pub fn new(http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self { http, clock }
    }

    pub async fn extract(
        &self,
        url: &str,
        source: &FeedSource,
        deadline: Duration,
    ) -> Result<Article, ExtractionFailure> {
        let response = match self.http.get(url, deadline).await {
            Ok(response) => response,
            Err(Error::Timeout(_)) => return Err(ExtractionFailure::Timeout),
            Err(e) => return Err(ExtractionFailure::NetworkError(e.to_string())),
        };
        if !(200..300).contains(&response.status) {
            return Err(ExtractionFailure::HttpError(response.status));
        }
        if let Some(content_type) = response.content_type.as_deref() {
            let lower = content_type.to_ascii_lowercase();
            if !lower.contains("html") && !lower.contains("xml") {
                return Err(ExtractionFailure::Unparseable);
            }
        }

        let candidates = charset::candidates(&response.body, response.content_type.as_deref());
        let html = candidates
            .iter()
            .find(|c| !c.had_errors)
            .or_else(|| candidates.first())
            .map(|c| c.text.clone())
            .ok_or(ExtractionFailure::Unparseable)?;

        let document = Html::parse_document(&html);
        let body = match select_body(&document) {
            Some(body) => body,
            None => return Err(ExtractionFailure::BodyTooShort(0)),
        };
        let body = text::clean_article_text(&body);
        let body_chars = body.chars().count();
        if body_chars < MIN_BODY_CHARS {
            return Err(ExtractionFailure::BodyTooShort(body_chars));
        }

        let title = extract_title(&document);
        debug!(url, title = %title, chars = body_chars, "extracted article");

        Ok(Article {
            title,
            url: url.to_string(),
            body,
            source: source.clone(),
            fetched_at: self.clock.now(),
        })
    }
}

fn select_body(document: &Html) -> Option<String> {
    // 1. The semantic article element.
    let article = Selector::parse("article").unwrap();
    if let Some(el) = document.select(&article).next() {
        let body = text::visible_text_of(el, AD_PATTERNS);
        if body.chars().count() >= MIN_BODY_CHARS {
            return Some(body);
        }
    }

    // 2. Known news-body containers.
    for selector in BODY_SELECTORS {
        let selector = Selector::parse(selector).unwrap();
        if let Some(el) = document.select(&selector).next() {
            let body = text::visible_text_of(el, AD_PATTERNS);
            if body.chars().count() >= MIN_BODY_CHARS {
                return Some(body);
            }
        }
    }

    // 3. Largest div by visible text length.
    let div = Selector::parse("div").unwrap();
    let largest = document
        .select(&div)
        .map(|el| text::visible_text_of(el, AD_PATTERNS))
        .max_by_key(|body| body.chars().count());
    if let Some(body) = largest {
        if body.chars().count() >= MIN_BODY_CHARS {
            return Some(body);
        }
    }

    // 4. Every paragraph under body.
    let paragraphs = Selector::parse("body p").unwrap();
    let joined = document
        .select(&paragraphs)
        .map(|el| text::visible_text_of(el, AD_PATTERNS))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn extract_title(document: &Html) -> String {
    let og_title = Selector::parse("meta[property=\"og:title\"]").unwrap();
    if let Some(content) = document
        .select(&og_title)
        .next()
        .and_then(|el| el.value().attr("content"))
    {
        let title = text::normalize_whitespace(content);
        if !title.is_empty() {
            return title;
        }
    }

    let title_tag = Selector::parse("title").unwrap();
    if let Some(el) = document.select(&title_tag).next() {
        let title = text::normalize_whitespace(&el.text().collect::<String>());
        if !title.is_empty() {
            return title;
        }
    }

    let h1 = Selector::parse("h1").unwrap();
    document
        .select(&h1)
        .next()
        .map(|el| text::normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sokbo_core::{HttpResponse, NewsCategory, Result, SystemClock};

    struct CannedHttp {
        status: u16,
        body: Vec<u8>,
        content_type: Option<String>,
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn get(&self, url: &str, _deadline: Duration) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
                content_type: self.content_type.clone(),
                final_url: url.to_string(),
            })
        }
    }

    fn test_source() -> FeedSource {
        FeedSource {
            name: "테스트".to_string(),
            category: NewsCategory::It,
            rss_url: "https://example.com/rss".to_string(),
        }
    }

    fn extractor_for(html: &str) -> ArticleExtractor {
        ArticleExtractor::new(
            Arc::new(CannedHttp {
                status: 200,
                body: html.as_bytes().to_vec(),
                content_type: Some("text/html; charset=utf-8".to_string()),
            }),
            Arc::new(SystemClock),
        )
    }

    fn long_sentence() -> String {
        "삼성전자가 차세대 반도체 공정 로드맵을 공개하고 대규모 투자를 예고했다. ".repeat(5)
    }

    #[tokio::test]
    async fn korean_body_selector_wins_and_ads_are_dropped() {
        let html = format!(
            r#"<html><head>
              <meta property="og:title" content="반도체 투자 확대">
              <title>fallback title</title>
            </head><body>
              <div id="articleBodyContents">
                <p>{}</p>
                <div class="ad-banner">광고 배너</div>
                <script>trackPageView();</script>
              </div>
            </body></html>"#,
            long_sentence()
        );
        let extractor = extractor_for(&html);
        let article = extractor
            .extract("https://example.com/news/1", &test_source(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(article.title, "반도체 투자 확대");
        assert!(article.body.contains("삼성전자"));
        assert!(!article.body.contains("광고 배너"));
        assert!(!article.body.contains("trackPageView"));
    }

    #[tokio::test]
    async fn largest_div_fallback_applies() {
        let html = format!(
            "<html><head><title>제목</title></head><body><div class=\"odd\"><p>{}</p></div></body></html>",
            long_sentence()
        );
        let extractor = extractor_for(&html);
        let article = extractor
            .extract("https://example.com/news/2", &test_source(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(article.title, "제목");
        assert!(article.body.chars().count() >= MIN_BODY_CHARS);
    }

    #[tokio::test]
    async fn paragraph_fallback_collects_scattered_text() {
        // Body text split over many short paragraphs directly under body, so
        // no single container passes the length bar on its own.
        let sentence = "반도체 시장이 다시 움직이고 있다.";
        let paragraphs: String = (0..12).map(|_| format!("<p>{}</p>", sentence)).collect();
        let html = format!(
            "<html><head><title>제목</title></head><body>{}</body></html>",
            paragraphs
        );
        let extractor = extractor_for(&html);
        let article = extractor
            .extract("https://example.com/news/4", &test_source(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(article.body.chars().count() >= MIN_BODY_CHARS);
        assert!(article.body.contains("반도체 시장"));
    }

    #[tokio::test]
    async fn short_body_is_rejected() {
        let html = "<html><body><article><p>짧은 본문</p></article></body></html>";
        let extractor = extractor_for(html);
        let err = extractor
            .extract("https://example.com/news/3", &test_source(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionFailure::BodyTooShort(_)));
    }

    #[tokio::test]
    async fn http_error_is_surfaced() {
        let extractor = ArticleExtractor::new(
            Arc::new(CannedHttp {
                status: 404,
                body: Vec::new(),
                content_type: None,
            }),
            Arc::new(SystemClock),
        );
        let err = extractor
            .extract("https://example.com/gone", &test_source(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, ExtractionFailure::HttpError(404));
    }

    #[tokio::test]
    async fn non_html_content_is_unparseable() {
        let extractor = ArticleExtractor::new(
            Arc::new(CannedHttp {
                status: 200,
                body: vec![0x25, 0x50, 0x44, 0x46],
                content_type: Some("application/pdf".to_string()),
            }),
            Arc::new(SystemClock),
        );
        let err = extractor
            .extract("https://example.com/doc.pdf", &test_source(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, ExtractionFailure::Unparseable);
    }
}
