use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsCategory {
    General,
    It,
    Economy,
    Broadcast,
    Politics,
    Society,
    Culture,
    International,
    Entertainment,
    Sports,
    Government,
}

impl NewsCategory {
    pub const ALL: &'static [NewsCategory] = &[
        NewsCategory::General,
        NewsCategory::It,
        NewsCategory::Economy,
        NewsCategory::Broadcast,
        NewsCategory::Politics,
        NewsCategory::Society,
        NewsCategory::Culture,
        NewsCategory::International,
        NewsCategory::Entertainment,
        NewsCategory::Sports,
        NewsCategory::Government,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsCategory::General => "general",
            NewsCategory::It => "it",
            NewsCategory::Economy => "economy",
            NewsCategory::Broadcast => "broadcast",
            NewsCategory::Politics => "politics",
            NewsCategory::Society => "society",
            NewsCategory::Culture => "culture",
            NewsCategory::International => "international",
            NewsCategory::Entertainment => "entertainment",
            NewsCategory::Sports => "sports",
            NewsCategory::Government => "government",
        }
    }

    pub fn parse(value: &str) -> Option<NewsCategory> {
        Self::ALL.iter().copied().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::En => "en",
        }
    }

    pub fn parse(value: &str) -> Option<Language> {
        match value {
            "ko" => Some(Language::Ko),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageHint {
    Ko,
    En,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub category: NewsCategory,
    pub rss_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source: FeedSource,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub body: String,
    pub source: FeedSource,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    pub terms: Vec<String>,
    pub language: LanguageHint,
}

impl KeywordSet {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizedArticle {
    pub article: Article,
    pub summary: String,
    pub language: Language,
    pub model: String,
    pub produced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub user_id: String,
    pub article_url: String,
    pub article_title: String,
    pub content_excerpt: String,
    pub summary_text: String,
    pub summary_language: Language,
    pub original_length: i64,
    pub summary_length: i64,
    pub keywords: Vec<String>,
    pub category: Option<NewsCategory>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub records: Vec<HistoryRecord>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_id: String,
    pub article_url: String,
    pub rating: u8,
    pub feedback_type: FeedbackKind,
    pub created_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Ratings are a 1..=5 scale.
    pub fn validate(&self) -> crate::Result<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(crate::Error::InvalidRequest(format!(
                "rating must be between 1 and 5, got {}",
                self.rating
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Keyword,
    Category,
    Trending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub article_title: String,
    pub article_url: String,
    pub article_source: String,
    pub category: Option<NewsCategory>,
    pub keywords: Vec<String>,
    pub recommendation_type: RecommendationKind,
    pub recommendation_score: f64,
    pub created_at: DateTime<Utc>,
}
