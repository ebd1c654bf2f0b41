use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use sokbo_core::{
    Clock, CoreConfig, Error, FeedEntry, FeedSource, FeedbackRecord, HistoryPage, HistoryRecord,
    HistoryStore, HttpClient, Language, LanguageHint, LlmClient, MailSender, NewsCategory,
    PipelineRequest, Recommendation, Result, Stage, StageError, SummarizeResponse,
    SummarizedArticle, SummaryItem,
};
use sokbo_feeds::fetcher::canonicalize_link;
use sokbo_feeds::text::truncate_chars;
use sokbo_feeds::{ArticleExtractor, FeedFetcher, FeedRegistry, FetchOutcome};
use sokbo_inference::keywords::heuristic_terms;
use sokbo_inference::{KeywordExtractor, Summarizer};

use crate::cache::IdempotencyCache;
use crate::classify;
use crate::filter;
use crate::mailer::DigestMailer;
use crate::recommend::Recommender;

const EXCERPT_CHARS: usize = 500;

/// The concurrency core: fans a request out over feeds, articles and the LLM
/// with bounded parallelism, collects per-item failures, and persists what
/// succeeded.
pub struct NewsPipeline {
    config: CoreConfig,
    registry: Arc<FeedRegistry>,
    fetcher: Arc<FeedFetcher>,
    extractor: Arc<ArticleExtractor>,
    keyword_extractor: Arc<KeywordExtractor>,
    summarizer: Arc<Summarizer>,
    store: Arc<dyn HistoryStore>,
    mailer: DigestMailer,
    recommender: Recommender,
    clock: Arc<dyn Clock>,
    cache: IdempotencyCache,
}

enum ItemOutcome {
    Summarized(Box<SummarizedArticle>),
    ExtractFailed {
        url: String,
        kind: &'static str,
        message: String,
    },
    SummarizeFailed {
        url: String,
        error: Error,
        deadline_bound: bool,
    },
    DeadlineSkipped {
        url: String,
    },
}

impl NewsPipeline {
    pub fn new(
        config: CoreConfig,
        registry: Arc<FeedRegistry>,
        http: Arc<dyn HttpClient>,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn HistoryStore>,
        mail: Arc<dyn MailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetcher = Arc::new(FeedFetcher::new(Arc::clone(&http)));
        let extractor = Arc::new(ArticleExtractor::new(Arc::clone(&http), Arc::clone(&clock)));
        let keyword_extractor = Arc::new(KeywordExtractor::new(
            Arc::clone(&llm),
            config.llm_model.clone(),
        ));
        let summarizer = Arc::new(Summarizer::new(
            Arc::clone(&llm),
            Arc::clone(&clock),
            config.llm_model.clone(),
            config.body_soft_cap,
            config.body_hard_cap,
        ));
        let cache = IdempotencyCache::new(
            config.idempotency_window,
            config.idempotency_capacity,
            Arc::clone(&clock),
        );
        let recommender = Recommender::new(
            Arc::clone(&registry),
            Arc::clone(&fetcher),
            Arc::clone(&store),
            Arc::clone(&clock),
            config.clone(),
        );

        Self {
            config,
            registry,
            fetcher,
            extractor,
            keyword_extractor,
            summarizer,
            store,
            mailer: DigestMailer::new(mail),
            recommender,
            clock,
            cache,
        }
    }

    pub async fn summarize_by_query(&self, request: PipelineRequest) -> Result<SummarizeResponse> {
        if !request.is_query_path() {
            return Err(Error::InvalidRequest(
                "summarize_by_query requires a query".to_string(),
            ));
        }
        self.run(request).await
    }

    pub async fn summarize_by_rss(&self, request: PipelineRequest) -> Result<SummarizeResponse> {
        if request.is_query_path() {
            return Err(Error::InvalidRequest(
                "summarize_by_rss takes explicit URLs, not a query".to_string(),
            ));
        }
        self.run(request).await
    }

    pub async fn history(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
        language: Option<Language>,
    ) -> Result<HistoryPage> {
        self.store.list(user_id, page, per_page, language).await
    }

    pub async fn recommendations(&self, user_id: &str, limit: usize) -> Result<Vec<Recommendation>> {
        self.recommender.recommend(user_id, limit).await
    }

    pub async fn record_feedback(&self, feedback: FeedbackRecord) -> Result<()> {
        self.store.insert_feedback(&feedback).await
    }

    pub async fn record_recommendation_click(&self, user_id: &str, article_url: &str) -> Result<()> {
        self.store
            .insert_recommendation_click(user_id, article_url, self.clock.now())
            .await
    }

    async fn run(&self, request: PipelineRequest) -> Result<SummarizeResponse> {
        request.validate()?;
        let key = IdempotencyCache::request_key(&request);
        if let Some(cached) = self.cache.get(&key).await {
            info!("identical request within the idempotency window, replaying cached response");
            return Ok(cached);
        }

        let started = Instant::now();
        let deadline = self.config.request_deadline;
        let max_articles = request.effective_max_articles(self.config.max_articles_hard);
        let mut errors: Vec<StageError> = Vec::new();
        let mut partial = false;

        let (selected, extracted_keywords) = if request.is_query_path() {
            let query = request.query.as_deref().unwrap_or_default();
            let keyword_deadline = self
                .config
                .llm_timeout
                .min(deadline.saturating_sub(started.elapsed()));
            let keyword_set = self.keyword_extractor.extract(query, keyword_deadline).await?;
            info!(keywords = ?keyword_set.terms, "extracted query keywords");

            let sources: Vec<FeedSource> = self.registry.list().to_vec();
            if sources.is_empty() {
                return Err(Error::Config("no feeds configured".to_string()));
            }
            let (entries, mut feed_errors, feed_partial) =
                self.fetch_feeds(&sources, started, deadline).await;
            errors.append(&mut feed_errors);
            partial |= feed_partial;
            debug!(entries = entries.len(), "gathered feed entries");

            let selected = filter::rank_entries(entries, &keyword_set, max_articles);
            (selected, Some(keyword_set.terms))
        } else {
            let sources: Vec<FeedSource> = request
                .rss_urls
                .iter()
                .map(|url| self.feed_source_for(url))
                .collect();
            let (mut entries, mut feed_errors, feed_partial) =
                self.fetch_feeds(&sources, started, deadline).await;
            errors.append(&mut feed_errors);
            partial |= feed_partial;

            for raw in &request.article_urls {
                match canonicalize_link(raw) {
                    Some(link) => entries.push(FeedEntry {
                        title: String::new(),
                        link,
                        published_at: None,
                        source: self.article_source_for(raw),
                        snippet: None,
                    }),
                    None => errors.push(StageError::new(
                        Stage::Extract,
                        Some(raw),
                        "invalid_url",
                        "article URL is not a valid http(s) URL",
                    )),
                }
            }
            entries.truncate(max_articles);
            (entries, None)
        };

        let (summarized, mut item_errors, items_partial) = self
            .process_entries(
                selected,
                request.language,
                request.custom_prompt.as_deref(),
                started,
                deadline,
            )
            .await;
        errors.append(&mut item_errors);
        partial |= items_partial;

        if summarized.is_empty() {
            warn!(errors = errors.len(), "pipeline produced no summaries");
            return Err(Error::NoResults);
        }

        if let Some(user_id) = request.user_id.as_deref() {
            let mut persist_errors = self
                .persist(user_id, &summarized, extracted_keywords.as_deref(), request.language)
                .await;
            errors.append(&mut persist_errors);
        }

        if let Some(recipient) = request.recipient_email.as_deref() {
            if let Err(e) = self
                .mailer
                .send_digest(recipient, &summarized, self.clock.now())
                .await
            {
                warn!(error = %e, "digest mail failed");
                errors.push(StageError::new(Stage::Mail, None, e.kind(), e.to_string()));
            }
        }

        let articles = summarized
            .iter()
            .map(|item| SummaryItem {
                title: item.article.title.clone(),
                url: item.article.url.clone(),
                source: item.article.source.name.clone(),
                summary: item.summary.clone(),
                language: item.language,
                category: classify::categorize(&item.article.title, &item.article.body)
                    .or(Some(item.article.source.category)),
            })
            .collect::<Vec<_>>();

        let response = SummarizeResponse {
            success: true,
            total_articles: articles.len(),
            articles,
            extracted_keywords,
            partial,
            errors,
            processed_at: self.clock.now(),
        };
        self.cache.put(key, response.clone()).await;
        info!(
            total = response.total_articles,
            partial = response.partial,
            errors = response.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline request complete"
        );
        Ok(response)
    }

    /// Fans feed fetches out under the feed semaphore. Results come back in
    /// source order. The bool is true when the request deadline cut work off.
    async fn fetch_feeds(
        &self,
        sources: &[FeedSource],
        started: Instant,
        deadline: Duration,
    ) -> (Vec<FeedEntry>, Vec<StageError>, bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.feed_parallelism));
        let fetch_timeout = self.config.fetch_timeout;
        let futures: Vec<_> = sources
            .iter()
            .map(|source| {
                let fetcher = Arc::clone(&self.fetcher);
                let semaphore = Arc::clone(&semaphore);
                let source = source.clone();
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return (source, Vec::new(), None, false);
                    };
                    let remaining = deadline.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return (source, Vec::new(), None, false);
                    }
                    let effective = fetch_timeout.min(remaining);
                    let deadline_bound = effective < fetch_timeout;
                    let (entries, outcome) = fetcher.fetch(&source, effective).await;
                    (source, entries, Some(outcome), deadline_bound)
                }
            })
            .collect();

        let mut entries = Vec::new();
        let mut errors = Vec::new();
        let mut partial = false;
        for (source, mut fetched, outcome, deadline_bound) in join_all(futures).await {
            match outcome {
                Some(FetchOutcome::Ok) => entries.append(&mut fetched),
                Some(outcome) => {
                    if deadline_bound && matches!(outcome, FetchOutcome::Timeout) {
                        partial = true;
                    }
                    errors.push(StageError::new(
                        Stage::Feed,
                        Some(&source.rss_url),
                        outcome.kind(),
                        outcome.message(),
                    ));
                }
                None => {
                    partial = true;
                    errors.push(StageError::new(
                        Stage::Feed,
                        Some(&source.rss_url),
                        "timeout",
                        "request deadline exhausted before this feed was fetched",
                    ));
                }
            }
        }
        (entries, errors, partial)
    }

    /// Runs extract then summarize for each selected entry. Stages are
    /// bounded by their own semaphores, so one entry can be summarizing
    /// while another is still extracting. Output order matches input order.
    async fn process_entries(
        &self,
        entries: Vec<FeedEntry>,
        language: Language,
        custom_prompt: Option<&str>,
        started: Instant,
        deadline: Duration,
    ) -> (Vec<SummarizedArticle>, Vec<StageError>, bool) {
        let extract_semaphore = Arc::new(Semaphore::new(self.config.article_parallelism));
        let llm_semaphore = Arc::new(Semaphore::new(self.config.llm_parallelism));
        let extract_timeout = self.config.extract_timeout;
        let llm_timeout = self.config.llm_timeout;

        let futures: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let extractor = Arc::clone(&self.extractor);
                let summarizer = Arc::clone(&self.summarizer);
                let extract_semaphore = Arc::clone(&extract_semaphore);
                let llm_semaphore = Arc::clone(&llm_semaphore);
                let custom_prompt = custom_prompt.map(|p| p.to_string());
                async move {
                    let article = {
                        let Ok(_permit) = extract_semaphore.acquire().await else {
                            return ItemOutcome::DeadlineSkipped { url: entry.link };
                        };
                        let remaining = deadline.saturating_sub(started.elapsed());
                        if remaining.is_zero() {
                            return ItemOutcome::DeadlineSkipped { url: entry.link };
                        }
                        match extractor
                            .extract(&entry.link, &entry.source, extract_timeout.min(remaining))
                            .await
                        {
                            Ok(mut article) => {
                                if article.title.is_empty() && !entry.title.is_empty() {
                                    article.title = entry.title.clone();
                                }
                                article
                            }
                            Err(failure) => {
                                return ItemOutcome::ExtractFailed {
                                    url: entry.link,
                                    kind: failure.kind(),
                                    message: failure.message(),
                                }
                            }
                        }
                    };

                    let Ok(_permit) = llm_semaphore.acquire().await else {
                        return ItemOutcome::DeadlineSkipped { url: article.url };
                    };
                    let remaining = deadline.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return ItemOutcome::DeadlineSkipped { url: article.url };
                    }
                    let effective = llm_timeout.min(remaining);
                    let deadline_bound = effective < llm_timeout;
                    match summarizer
                        .summarize(&article, language, custom_prompt.as_deref(), effective)
                        .await
                    {
                        Ok(summarized) => ItemOutcome::Summarized(Box::new(summarized)),
                        Err(error) => ItemOutcome::SummarizeFailed {
                            url: article.url,
                            error,
                            deadline_bound,
                        },
                    }
                }
            })
            .collect();

        let mut summarized = Vec::new();
        let mut errors = Vec::new();
        let mut partial = false;
        for outcome in join_all(futures).await {
            match outcome {
                ItemOutcome::Summarized(item) => summarized.push(*item),
                ItemOutcome::ExtractFailed { url, kind, message } => {
                    errors.push(StageError::new(Stage::Extract, Some(&url), kind, message));
                }
                ItemOutcome::SummarizeFailed {
                    url,
                    error,
                    deadline_bound,
                } => {
                    if deadline_bound && matches!(error, Error::Timeout(_)) {
                        partial = true;
                    }
                    errors.push(StageError::new(
                        Stage::Summarize,
                        Some(&url),
                        error.kind(),
                        error.to_string(),
                    ));
                }
                ItemOutcome::DeadlineSkipped { url } => {
                    partial = true;
                    errors.push(StageError::new(
                        Stage::Summarize,
                        Some(&url),
                        "timeout",
                        "request deadline exhausted before this article finished",
                    ));
                }
            }
        }
        (summarized, errors, partial)
    }

    async fn persist(
        &self,
        user_id: &str,
        summarized: &[SummarizedArticle],
        query_keywords: Option<&[String]>,
        language: Language,
    ) -> Vec<StageError> {
        let mut errors = Vec::new();
        for item in summarized {
            let record = self.history_record(user_id, item, query_keywords, language);
            match self.store.insert(&record).await {
                Ok(sokbo_core::InsertOutcome::Inserted(id)) => {
                    debug!(id = %id, url = %item.article.url, "history record stored");
                }
                Ok(sokbo_core::InsertOutcome::DuplicateIgnored) => {
                    debug!(url = %item.article.url, "duplicate history record ignored");
                }
                Err(e) => errors.push(StageError::new(
                    Stage::Persist,
                    Some(&item.article.url),
                    e.kind(),
                    e.to_string(),
                )),
            }
        }
        errors
    }

    fn history_record(
        &self,
        user_id: &str,
        item: &SummarizedArticle,
        query_keywords: Option<&[String]>,
        language: Language,
    ) -> HistoryRecord {
        let body = &item.article.body;
        let excerpt = if body.chars().count() > EXCERPT_CHARS {
            format!("{}...", truncate_chars(body, EXCERPT_CHARS))
        } else {
            body.clone()
        };
        let keywords = match query_keywords {
            Some(terms) if !terms.is_empty() => terms.to_vec(),
            _ => {
                let hint = match language {
                    Language::Ko => LanguageHint::Ko,
                    Language::En => LanguageHint::En,
                };
                heuristic_terms(&format!("{} {}", item.article.title, body), hint)
            }
        };
        let category = classify::categorize(&item.article.title, body)
            .or(Some(item.article.source.category));

        HistoryRecord {
            id: String::new(),
            user_id: user_id.to_string(),
            article_url: item.article.url.clone(),
            article_title: item.article.title.clone(),
            content_excerpt: excerpt,
            summary_text: item.summary.clone(),
            summary_language: item.language,
            original_length: body.chars().count() as i64,
            summary_length: item.summary.chars().count() as i64,
            keywords,
            category,
            created_at: self.clock.now(),
        }
    }

    /// Known registry feeds keep their metadata; unknown RSS URLs become
    /// ad-hoc general sources named after their host.
    fn feed_source_for(&self, rss_url: &str) -> FeedSource {
        if let Some(source) = self.registry.by_url(rss_url) {
            return source.clone();
        }
        FeedSource {
            name: host_of(rss_url),
            category: NewsCategory::General,
            rss_url: rss_url.to_string(),
        }
    }

    fn article_source_for(&self, article_url: &str) -> FeedSource {
        FeedSource {
            name: host_of(article_url),
            category: NewsCategory::General,
            rss_url: String::new(),
        }
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sokbo_core::{ChatMessage, HttpResponse, SystemClock};
    use sokbo_storage::MemoryHistoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::time::sleep;

    #[derive(Clone)]
    enum Canned {
        Body {
            body: String,
            content_type: &'static str,
        },
        Status(u16),
        Timeout,
    }

    struct MapHttp {
        routes: HashMap<String, Canned>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MapHttp {
        fn new(routes: HashMap<String, Canned>) -> Arc<Self> {
            Self::with_delay(routes, Duration::ZERO)
        }

        fn with_delay(routes: HashMap<String, Canned>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                routes,
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HttpClient for MapHttp {
        async fn get(&self, url: &str, _deadline: Duration) -> Result<HttpResponse> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            let canned = self.routes.get(url).cloned();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match canned {
                Some(Canned::Body { body, content_type }) => Ok(HttpResponse {
                    status: 200,
                    body: body.into_bytes(),
                    content_type: Some(content_type.to_string()),
                    final_url: url.to_string(),
                }),
                Some(Canned::Status(status)) => Ok(HttpResponse {
                    status,
                    body: Vec::new(),
                    content_type: None,
                    final_url: url.to_string(),
                }),
                Some(Canned::Timeout) => {
                    Err(Error::Timeout(format!("GET {} exceeded deadline", url)))
                }
                None => Ok(HttpResponse {
                    status: 404,
                    body: Vec::new(),
                    content_type: None,
                    final_url: url.to_string(),
                }),
            }
        }
    }

    struct MockLlm {
        keyword_reply: String,
        keyword_calls: AtomicUsize,
        summary_calls: AtomicUsize,
        /// Summary calls after this many sleep out their deadline.
        slow_summaries_after: Option<usize>,
    }

    impl MockLlm {
        fn new(keyword_reply: &str) -> Arc<Self> {
            Arc::new(Self {
                keyword_reply: keyword_reply.to_string(),
                keyword_calls: AtomicUsize::new(0),
                summary_calls: AtomicUsize::new(0),
                slow_summaries_after: None,
            })
        }

        fn slow_after(keyword_reply: &str, fast_summaries: usize) -> Arc<Self> {
            Arc::new(Self {
                keyword_reply: keyword_reply.to_string(),
                keyword_calls: AtomicUsize::new(0),
                summary_calls: AtomicUsize::new(0),
                slow_summaries_after: Some(fast_summaries),
            })
        }

        fn total_calls(&self) -> usize {
            self.keyword_calls.load(Ordering::SeqCst) + self.summary_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _model: &str,
            _max_tokens: u32,
            _temperature: f32,
            deadline: Duration,
        ) -> Result<String> {
            let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
            if system.starts_with("You extract") {
                self.keyword_calls.fetch_add(1, Ordering::SeqCst);
                return Ok(self.keyword_reply.clone());
            }

            let n = self.summary_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(fast) = self.slow_summaries_after {
                if n > fast {
                    sleep(deadline).await;
                    return Err(Error::Timeout("chat completion exceeded its deadline".to_string()));
                }
            }
            let user = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            if user.starts_with("Summarize in bullet points.") {
                Ok("- 첫 번째 요점\n- 두 번째 요점".to_string())
            } else {
                Ok("기사 핵심을 간추린 요약입니다.".to_string())
            }
        }
    }

    struct RecordingMailer {
        sent: StdMutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _html: &str, _text: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Mail("smtp refused the message".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn feed_xml(items: &[(&str, &str)]) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\"><channel><title>feed</title><link>https://feeds.example.com</link><description>test feed</description>",
        );
        for (title, link) in items {
            xml.push_str(&format!(
                "<item><title>{}</title><link>{}</link></item>",
                title, link
            ));
        }
        xml.push_str("</channel></rss>");
        xml
    }

    fn article_html(title: &str) -> Canned {
        let body = "삼성전자와 SK하이닉스가 반도체 생산 라인을 증설한다고 발표했다. ".repeat(5);
        Canned::Body {
            body: format!(
                "<html><head><title>{}</title></head><body><article><p>{}</p></article></body></html>",
                title, body
            ),
            content_type: "text/html; charset=utf-8",
        }
    }

    fn feed_body(items: &[(&str, &str)]) -> Canned {
        Canned::Body {
            body: feed_xml(items),
            content_type: "application/rss+xml",
        }
    }

    fn test_registry(feeds: &[(&str, NewsCategory)]) -> Arc<FeedRegistry> {
        let sources = feeds
            .iter()
            .enumerate()
            .map(|(i, (url, category))| FeedSource {
                name: format!("소스{}", i),
                category: *category,
                rss_url: url.to_string(),
            })
            .collect();
        Arc::new(FeedRegistry::new(sources).unwrap())
    }

    fn build(
        config: CoreConfig,
        registry: Arc<FeedRegistry>,
        http: Arc<MapHttp>,
        llm: Arc<MockLlm>,
        mailer: Arc<RecordingMailer>,
    ) -> (NewsPipeline, Arc<MemoryHistoryStore>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryHistoryStore::new(Arc::clone(&clock)));
        let pipeline = NewsPipeline::new(
            config,
            registry,
            http,
            llm,
            store.clone() as Arc<dyn HistoryStore>,
            mailer,
            clock,
        );
        (pipeline, store)
    }

    fn query_request(query: &str, max_articles: usize) -> PipelineRequest {
        PipelineRequest {
            query: Some(query.to_string()),
            rss_urls: Vec::new(),
            article_urls: Vec::new(),
            max_articles,
            language: Language::Ko,
            user_id: Some("u1".to_string()),
            recipient_email: None,
            custom_prompt: None,
        }
    }

    fn s1_routes() -> HashMap<String, Canned> {
        let mut routes = HashMap::new();
        routes.insert(
            "https://feeds.example.com/one".to_string(),
            feed_body(&[
                ("반도체 수출 반등", "https://news.example.com/k1"),
                ("날씨 소식", "https://news.example.com/w1"),
                ("반도체 공장 증설", "https://news.example.com/k2"),
                ("스포츠 결과", "https://news.example.com/s1"),
                ("반도체 인력난", "https://news.example.com/k3"),
            ]),
        );
        for key in ["k1", "k2", "k3", "w1", "s1"] {
            routes.insert(
                format!("https://news.example.com/{}", key),
                article_html(&format!("기사 {}", key)),
            );
        }
        routes
    }

    #[tokio::test]
    async fn s1_query_path_summarizes_matching_articles() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체, 수출");
        let (pipeline, store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(s1_routes()),
            llm.clone(),
            RecordingMailer::new(false),
        );

        let response = pipeline
            .summarize_by_query(query_request("최신 반도체 뉴스", 3))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.total_articles, 3);
        assert!(response
            .extracted_keywords
            .as_ref()
            .unwrap()
            .contains(&"반도체".to_string()));
        for item in &response.articles {
            assert!(!item.summary.is_empty());
            assert_eq!(item.language, Language::Ko);
            assert!(item.url.contains("/k"));
        }

        let page = store.list("u1", 1, 10, None).await.unwrap();
        assert_eq!(page.total, 3);
        assert!(page.records.iter().all(|r| r.keywords.contains(&"반도체".to_string())));
    }

    #[tokio::test]
    async fn s2_url_path_tolerates_a_timed_out_feed() {
        let mut routes = HashMap::new();
        routes.insert(
            "https://x.example.com/a".to_string(),
            feed_body(&[
                ("첫 기사", "https://news.example.com/a1"),
                ("둘째 기사", "https://news.example.com/a2"),
            ]),
        );
        routes.insert("https://x.example.com/b".to_string(), Canned::Timeout);
        routes.insert(
            "https://news.example.com/a1".to_string(),
            article_html("기사 a1"),
        );
        routes.insert(
            "https://news.example.com/a2".to_string(),
            article_html("기사 a2"),
        );
        routes.insert(
            "https://direct.example.com/d1".to_string(),
            article_html("직접 기사"),
        );

        let registry = test_registry(&[("https://unused.example.com/rss", NewsCategory::General)]);
        let llm = MockLlm::new("");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(routes),
            llm,
            RecordingMailer::new(false),
        );

        let request = PipelineRequest {
            query: None,
            rss_urls: vec![
                "https://x.example.com/a".to_string(),
                "https://x.example.com/b".to_string(),
            ],
            article_urls: vec!["https://direct.example.com/d1".to_string()],
            max_articles: 5,
            language: Language::En,
            user_id: None,
            recipient_email: None,
            custom_prompt: None,
        };
        let response = pipeline.summarize_by_rss(request).await.unwrap();

        assert_eq!(response.total_articles, 3);
        assert!(!response.partial);
        assert!(response.extracted_keywords.is_none());
        let timeout_errors: Vec<_> = response
            .errors
            .iter()
            .filter(|e| e.kind == "timeout")
            .collect();
        assert_eq!(timeout_errors.len(), 1);
        assert_eq!(
            timeout_errors[0].url.as_deref(),
            Some("https://x.example.com/b")
        );
        // Direct URL comes after the feed entries, preserving input order.
        assert_eq!(response.articles[2].url, "https://direct.example.com/d1");
    }

    #[tokio::test]
    async fn s3_no_matching_entries_is_no_results() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("xyzzy");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(s1_routes()),
            llm,
            RecordingMailer::new(false),
        );

        let err = pipeline
            .summarize_by_query(query_request("xyzzy-no-such-topic", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoResults));
    }

    #[tokio::test]
    async fn s4_identical_request_replays_the_cache() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(s1_routes()),
            llm.clone(),
            RecordingMailer::new(false),
        );

        let first = pipeline
            .summarize_by_query(query_request("반도체 뉴스 알려줘", 2))
            .await
            .unwrap();
        let calls_after_first = llm.total_calls();

        let second = pipeline
            .summarize_by_query(query_request("반도체 뉴스 알려줘", 2))
            .await
            .unwrap();
        assert_eq!(llm.total_calls(), calls_after_first);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn half_failing_feeds_still_produce_a_response() {
        let mut routes = s1_routes();
        routes.insert("https://feeds.example.com/down1".to_string(), Canned::Status(502));
        routes.insert("https://feeds.example.com/down2".to_string(), Canned::Status(503));
        let registry = test_registry(&[
            ("https://feeds.example.com/one", NewsCategory::It),
            ("https://feeds.example.com/down1", NewsCategory::General),
            ("https://feeds.example.com/down2", NewsCategory::Economy),
        ]);
        let llm = MockLlm::new("반도체");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(routes),
            llm,
            RecordingMailer::new(false),
        );

        let response = pipeline
            .summarize_by_query(query_request("반도체 뉴스", 3))
            .await
            .unwrap();
        assert!(response.total_articles >= 1);
        let feed_errors: Vec<_> = response
            .errors
            .iter()
            .filter(|e| e.stage == Stage::Feed && e.kind == "http_error")
            .collect();
        assert_eq!(feed_errors.len(), 2);
    }

    #[tokio::test]
    async fn feed_fetches_never_exceed_the_parallelism_cap() {
        let mut routes = HashMap::new();
        let mut feeds = Vec::new();
        for i in 0..20 {
            let url = format!("https://feeds.example.com/{}", i);
            routes.insert(url.clone(), feed_body(&[("무관한 기사", "https://news.example.com/x")]));
            feeds.push((url, NewsCategory::General));
        }
        let feeds_ref: Vec<(&str, NewsCategory)> = feeds
            .iter()
            .map(|(url, category)| (url.as_str(), *category))
            .collect();
        let registry = test_registry(&feeds_ref);
        let http = MapHttp::with_delay(routes, Duration::from_millis(30));
        let llm = MockLlm::new("반도체");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            http.clone(),
            llm,
            RecordingMailer::new(false),
        );

        // No entry matches, so the run ends with NoResults; only the feed
        // stage matters here.
        let _ = pipeline
            .summarize_by_query(query_request("반도체", 3))
            .await;
        assert!(http.max_in_flight.load(Ordering::SeqCst) <= 8);
    }

    #[tokio::test]
    async fn request_deadline_returns_partial_results() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        // One summary completes; the rest sleep out the remaining deadline.
        let llm = MockLlm::slow_after("반도체", 1);
        let mut config = CoreConfig::default();
        config.request_deadline = Duration::from_millis(300);
        let (pipeline, _store) = build(
            config,
            registry,
            MapHttp::new(s1_routes()),
            llm,
            RecordingMailer::new(false),
        );

        let started = std::time::Instant::now();
        let response = pipeline
            .summarize_by_query(query_request("반도체 뉴스", 3))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(900));
        assert!(response.partial);
        assert_eq!(response.total_articles, 1);
        assert!(response
            .errors
            .iter()
            .any(|e| e.stage == Stage::Summarize && e.kind == "timeout"));
    }

    #[tokio::test]
    async fn s6_custom_prompt_shapes_the_summaries() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(s1_routes()),
            llm,
            RecordingMailer::new(false),
        );

        let mut request = query_request("반도체 뉴스", 2);
        request.custom_prompt = Some("Summarize in bullet points.".to_string());
        let response = pipeline.summarize_by_query(request).await.unwrap();
        for item in &response.articles {
            assert!(item.summary.contains('-'));
        }
    }

    #[tokio::test]
    async fn mail_failure_never_fails_the_response() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체");
        let mailer = RecordingMailer::new(true);
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(s1_routes()),
            llm,
            mailer,
        );

        let mut request = query_request("반도체 뉴스", 2);
        request.recipient_email = Some("user@example.com".to_string());
        let response = pipeline.summarize_by_query(request).await.unwrap();
        assert!(response.success);
        assert!(response
            .errors
            .iter()
            .any(|e| e.stage == Stage::Mail && e.kind == "mail_error"));
    }

    #[tokio::test]
    async fn digest_mail_is_dispatched_on_success() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체");
        let mailer = RecordingMailer::new(false);
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(s1_routes()),
            llm,
            mailer.clone(),
        );

        let mut request = query_request("반도체 뉴스", 2);
        request.recipient_email = Some("user@example.com".to_string());
        pipeline.summarize_by_query(request).await.unwrap();
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "user@example.com");
    }

    #[tokio::test]
    async fn query_and_urls_together_are_rejected() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(HashMap::new()),
            llm,
            RecordingMailer::new(false),
        );

        let mut request = query_request("반도체", 3);
        request.rss_urls.push("https://x.example.com/a".to_string());
        let err = pipeline.summarize_by_query(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn feedback_and_clicks_reach_the_store() {
        let registry = test_registry(&[("https://feeds.example.com/one", NewsCategory::It)]);
        let llm = MockLlm::new("반도체");
        let (pipeline, _store) = build(
            CoreConfig::default(),
            registry,
            MapHttp::new(HashMap::new()),
            llm,
            RecordingMailer::new(false),
        );

        pipeline
            .record_feedback(FeedbackRecord {
                user_id: "u1".to_string(),
                article_url: "https://news.example.com/k1".to_string(),
                rating: 4,
                feedback_type: sokbo_core::FeedbackKind::Positive,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        pipeline
            .record_recommendation_click("u1", "https://news.example.com/k1")
            .await
            .unwrap();
    }
}
