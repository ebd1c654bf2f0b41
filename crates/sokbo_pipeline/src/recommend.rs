use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use sokbo_core::{
    Clock, CoreConfig, FeedEntry, HistoryStore, NewsCategory, Recommendation, RecommendationKind,
    Result,
};
use sokbo_feeds::{FeedFetcher, FeedRegistry};

const MAX_RECOMMENDATIONS: usize = 20;
const TRENDING_PER_SOURCE: usize = 2;
const CANDIDATE_PER_SOURCE: usize = 5;
const TOP_CATEGORIES: usize = 3;
const TRENDING_HALF_LIFE_HOURS: f64 = 48.0;

/// Computes ranked recommendations from a user's history signals, on demand.
pub struct Recommender {
    registry: Arc<FeedRegistry>,
    fetcher: Arc<FeedFetcher>,
    store: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
}

impl Recommender {
    pub fn new(
        registry: Arc<FeedRegistry>,
        fetcher: Arc<FeedFetcher>,
        store: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Self {
        Self {
            registry,
            fetcher,
            store,
            clock,
            config,
        }
    }

    pub async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<Recommendation>> {
        let limit = limit.clamp(1, MAX_RECOMMENDATIONS);
        let window = self.config.recommendation_window_days;
        let keywords = self.store.keywords_of_user(user_id, window).await?;
        let categories = self.store.categories_of_user(user_id, window).await?;
        let seen = self.store.urls_of_user(user_id).await?;
        let now = self.clock.now();

        if keywords.is_empty() && categories.is_empty() {
            debug!(user_id, "no history signals, serving trending mix");
            return Ok(self.trending(limit, &seen, now).await);
        }

        let entries = self.gather_entries(CANDIDATE_PER_SOURCE).await;
        let mut candidates: HashMap<String, Recommendation> = HashMap::new();

        // Keyword affinity over entry titles.
        let normalize = keywords.iter().map(|(_, freq)| freq).sum::<u64>().max(1) as f64;
        for entry in &entries {
            let title = entry.title.to_lowercase();
            let mut matched = Vec::new();
            let mut weighted_hits = 0.0;
            for (term, freq) in &keywords {
                let hits = count_occurrences(&title, &term.to_lowercase());
                if hits > 0 {
                    matched.push(term.clone());
                    weighted_hits += (*freq * hits as u64) as f64;
                }
            }
            if weighted_hits > 0.0 {
                merge_candidate(
                    &mut candidates,
                    recommendation(entry, RecommendationKind::Keyword, weighted_hits / normalize, matched, now),
                );
            }
        }

        // Category affinity from the user's top categories.
        let total: u64 = categories.iter().map(|(_, freq)| freq).sum();
        let top: HashMap<NewsCategory, u64> = categories
            .iter()
            .take(TOP_CATEGORIES)
            .map(|(category, freq)| (*category, *freq))
            .collect();
        if total > 0 {
            for entry in &entries {
                if let Some(freq) = top.get(&entry.source.category) {
                    let score = *freq as f64 / total as f64;
                    merge_candidate(
                        &mut candidates,
                        recommendation(entry, RecommendationKind::Category, score, Vec::new(), now),
                    );
                }
            }
        }

        let mut ranked: Vec<Recommendation> = candidates
            .into_values()
            .filter(|r| !seen.contains(&r.article_url))
            .collect();
        ranked.sort_by(|a, b| {
            b.recommendation_score
                .partial_cmp(&a.recommendation_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        normalize_scores(&mut ranked);
        Ok(ranked)
    }

    /// Recency-only fallback when the user has no history at all.
    async fn trending(
        &self,
        limit: usize,
        seen: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let entries = self.gather_entries(TRENDING_PER_SOURCE).await;
        let mut candidates: HashMap<String, Recommendation> = HashMap::new();
        for entry in &entries {
            if seen.contains(&entry.link) {
                continue;
            }
            let age_hours = entry
                .published_at
                .map(|t| (now - t).num_minutes() as f64 / 60.0)
                .unwrap_or(TRENDING_HALF_LIFE_HOURS)
                .max(0.0);
            let score = (-age_hours / TRENDING_HALF_LIFE_HOURS).exp().clamp(0.0, 1.0);
            merge_candidate(
                &mut candidates,
                recommendation(entry, RecommendationKind::Trending, score, Vec::new(), now),
            );
        }

        let mut ranked: Vec<Recommendation> = candidates.into_values().collect();
        ranked.sort_by(|a, b| {
            b.recommendation_score
                .partial_cmp(&a.recommendation_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        normalize_scores(&mut ranked);
        ranked
    }

    /// Pulls a bounded sample of current entries from every registered feed.
    /// Per-feed failures only cost their entries.
    async fn gather_entries(&self, per_source: usize) -> Vec<FeedEntry> {
        let semaphore = Arc::new(Semaphore::new(self.config.feed_parallelism));
        let futures: Vec<_> = self
            .registry
            .list()
            .iter()
            .map(|source| {
                let fetcher = Arc::clone(&self.fetcher);
                let semaphore = Arc::clone(&semaphore);
                let source = source.clone();
                let timeout = self.config.fetch_timeout;
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return Vec::new();
                    };
                    let (entries, outcome) = fetcher.fetch(&source, timeout).await;
                    if !outcome.is_ok() {
                        debug!(source = %source.name, kind = outcome.kind(), "feed skipped for recommendations");
                    }
                    entries.into_iter().take(per_source).collect::<Vec<_>>()
                }
            })
            .collect();
        join_all(futures).await.into_iter().flatten().collect()
    }
}

fn recommendation(
    entry: &FeedEntry,
    kind: RecommendationKind,
    score: f64,
    keywords: Vec<String>,
    now: DateTime<Utc>,
) -> Recommendation {
    Recommendation {
        article_title: entry.title.clone(),
        article_url: entry.link.clone(),
        article_source: entry.source.name.clone(),
        category: Some(entry.source.category),
        keywords,
        recommendation_type: kind,
        recommendation_score: score,
        created_at: now,
    }
}

/// Deduplicates on URL, keeping whichever candidate scored higher.
fn merge_candidate(candidates: &mut HashMap<String, Recommendation>, candidate: Recommendation) {
    match candidates.get_mut(&candidate.article_url) {
        Some(existing) if existing.recommendation_score >= candidate.recommendation_score => {}
        Some(existing) => *existing = candidate,
        None => {
            candidates.insert(candidate.article_url.clone(), candidate);
        }
    }
}

/// Min-max normalization into [0, 1] within the returned set. A single
/// distinct score maps to 1.0.
fn normalize_scores(ranked: &mut [Recommendation]) {
    let Some(max) = ranked
        .iter()
        .map(|r| r.recommendation_score)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
    else {
        return;
    };
    let min = ranked
        .iter()
        .map(|r| r.recommendation_score)
        .fold(max, f64::min);
    for rec in ranked.iter_mut() {
        rec.recommendation_score = if (max - min).abs() < f64::EPSILON {
            1.0
        } else {
            (rec.recommendation_score - min) / (max - min)
        };
    }
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
