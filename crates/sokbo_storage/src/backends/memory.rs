use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use sokbo_core::{
    Clock, FeedbackRecord, HistoryPage, HistoryRecord, HistoryStore, InsertOutcome, Language,
    NewsCategory, Result,
};

const MAX_PER_PAGE: u32 = 100;

#[derive(Default)]
struct MemoryState {
    history: Vec<HistoryRecord>,
    feedback: Vec<FeedbackRecord>,
    clicks: Vec<(String, String, DateTime<Utc>)>,
}

/// History store backed by process memory. Used by tests and the CLI's
/// default configuration.
pub struct MemoryHistoryStore {
    state: Arc<RwLock<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryHistoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            clock,
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(&self, record: &HistoryRecord) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        let second = record.created_at.timestamp();
        let duplicate = state.history.iter().any(|r| {
            r.user_id == record.user_id
                && r.article_url == record.article_url
                && r.created_at.timestamp() == second
        });
        if duplicate {
            return Ok(InsertOutcome::DuplicateIgnored);
        }

        let mut record = record.clone();
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        state.history.push(record);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn list(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
        language: Option<Language>,
    ) -> Result<HistoryPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);

        let state = self.state.read().await;
        let mut records: Vec<HistoryRecord> = state
            .history
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| language.map_or(true, |l| r.summary_language == l))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len() as u64;
        let offset = (page as usize - 1).saturating_mul(per_page as usize);
        let records = records
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();
        Ok(HistoryPage {
            records,
            total,
            page,
            per_page,
        })
    }

    async fn keywords_of_user(&self, user_id: &str, since_days: i64) -> Result<Vec<(String, u64)>> {
        let cutoff = self.clock.now() - ChronoDuration::days(since_days);
        let state = self.state.read().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for record in state
            .history
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= cutoff)
        {
            for keyword in &record.keywords {
                *counts.entry(keyword.clone()).or_insert(0) += 1;
            }
        }
        let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    async fn categories_of_user(
        &self,
        user_id: &str,
        since_days: i64,
    ) -> Result<Vec<(NewsCategory, u64)>> {
        let cutoff = self.clock.now() - ChronoDuration::days(since_days);
        let state = self.state.read().await;
        let mut counts: HashMap<NewsCategory, u64> = HashMap::new();
        for record in state
            .history
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= cutoff)
        {
            if let Some(category) = record.category {
                *counts.entry(category).or_insert(0) += 1;
            }
        }
        let mut counts: Vec<(NewsCategory, u64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        Ok(counts)
    }

    async fn urls_of_user(&self, user_id: &str) -> Result<HashSet<String>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.article_url.clone())
            .collect())
    }

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        feedback.validate()?;
        self.state.write().await.feedback.push(feedback.clone());
        Ok(())
    }

    async fn insert_recommendation_click(
        &self,
        user_id: &str,
        article_url: &str,
        clicked_at: DateTime<Utc>,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .clicks
            .push((user_id.to_string(), article_url.to_string(), clicked_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sokbo_core::FeedbackKind;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn record(user: &str, url: &str, created_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            id: String::new(),
            user_id: user.to_string(),
            article_url: url.to_string(),
            article_title: "제목".to_string(),
            content_excerpt: "발췌".to_string(),
            summary_text: "요약".to_string(),
            summary_language: Language::Ko,
            original_length: 1000,
            summary_length: 100,
            keywords: vec!["반도체".to_string(), "수출".to_string()],
            category: Some(NewsCategory::It),
            created_at,
        }
    }

    fn store_at(now: DateTime<Utc>) -> MemoryHistoryStore {
        MemoryHistoryStore::new(Arc::new(FixedClock(now)))
    }

    #[tokio::test]
    async fn duplicate_within_same_second_is_ignored() {
        let now = Utc::now();
        let store = store_at(now);
        let rec = record("u1", "https://example.com/a", now);
        assert!(matches!(
            store.insert(&rec).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert_eq!(
            store.insert(&rec).await.unwrap(),
            InsertOutcome::DuplicateIgnored
        );

        let page = store.list("u1", 1, 10, None).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_paginated() {
        let now = Utc::now();
        let store = store_at(now);
        for i in 0..5 {
            let created = now - ChronoDuration::minutes(i);
            store
                .insert(&record("u1", &format!("https://example.com/{}", i), created))
                .await
                .unwrap();
        }
        store
            .insert(&record("other", "https://example.com/x", now))
            .await
            .unwrap();

        let page = store.list("u1", 1, 2, None).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].article_url, "https://example.com/0");

        let page3 = store.list("u1", 3, 2, None).await.unwrap();
        assert_eq!(page3.records.len(), 1);
        assert_eq!(page3.records[0].article_url, "https://example.com/4");
    }

    #[tokio::test]
    async fn language_filter_applies() {
        let now = Utc::now();
        let store = store_at(now);
        let mut ko = record("u1", "https://example.com/ko", now);
        ko.summary_language = Language::Ko;
        let mut en = record("u1", "https://example.com/en", now - ChronoDuration::seconds(1));
        en.summary_language = Language::En;
        store.insert(&ko).await.unwrap();
        store.insert(&en).await.unwrap();

        let page = store.list("u1", 1, 10, Some(Language::En)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].article_url, "https://example.com/en");
    }

    #[tokio::test]
    async fn keyword_and_category_windows_exclude_old_records() {
        let now = Utc::now();
        let store = store_at(now);
        store
            .insert(&record("u1", "https://example.com/new", now))
            .await
            .unwrap();
        store
            .insert(&record(
                "u1",
                "https://example.com/old",
                now - ChronoDuration::days(40),
            ))
            .await
            .unwrap();

        let keywords = store.keywords_of_user("u1", 30).await.unwrap();
        assert_eq!(keywords.iter().find(|(k, _)| k == "반도체").unwrap().1, 1);

        let categories = store.categories_of_user("u1", 30).await.unwrap();
        assert_eq!(categories, vec![(NewsCategory::It, 1)]);

        let urls = store.urls_of_user("u1").await.unwrap();
        assert!(urls.contains("https://example.com/old"));
        assert_eq!(urls.len(), 2);
    }

    #[tokio::test]
    async fn feedback_is_validated() {
        let now = Utc::now();
        let store = store_at(now);
        let mut feedback = FeedbackRecord {
            user_id: "u1".to_string(),
            article_url: "https://example.com/a".to_string(),
            rating: 4,
            feedback_type: FeedbackKind::Positive,
            created_at: now,
        };
        store.insert_feedback(&feedback).await.unwrap();
        feedback.rating = 9;
        assert!(store.insert_feedback(&feedback).await.is_err());
    }
}
