use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Language, NewsCategory};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub rss_urls: Vec<String>,
    #[serde(default)]
    pub article_urls: Vec<String>,
    pub max_articles: usize,
    pub language: Language,
    pub user_id: Option<String>,
    pub recipient_email: Option<String>,
    pub custom_prompt: Option<String>,
}

impl PipelineRequest {
    /// Exactly one of `query` or the URL lists must be populated. The hard
    /// article cap is applied by clamping, not rejection.
    pub fn validate(&self) -> Result<()> {
        let has_query = self.query.as_deref().map_or(false, |q| !q.trim().is_empty());
        let has_urls = !self.rss_urls.is_empty() || !self.article_urls.is_empty();
        if has_query == has_urls {
            return Err(Error::InvalidRequest(
                "request must carry either a query or explicit URLs, not both".to_string(),
            ));
        }
        if self.max_articles == 0 {
            return Err(Error::InvalidRequest(
                "max_articles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective article budget after the configured hard cap.
    pub fn effective_max_articles(&self, max_articles_hard: usize) -> usize {
        self.max_articles.min(max_articles_hard)
    }

    pub fn is_query_path(&self) -> bool {
        self.query.as_deref().map_or(false, |q| !q.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Feed,
    Extract,
    Summarize,
    Persist,
    Mail,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Feed => "feed",
            Stage::Extract => "extract",
            Stage::Summarize => "summarize",
            Stage::Persist => "persist",
            Stage::Mail => "mail",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub url: Option<String>,
    pub kind: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, url: Option<&str>, kind: &str, message: impl Into<String>) -> Self {
        Self {
            stage,
            url: url.map(|u| u.to_string()),
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub summary: String,
    pub language: Language,
    pub category: Option<NewsCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub success: bool,
    pub articles: Vec<SummaryItem>,
    pub total_articles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_keywords: Option<Vec<String>>,
    pub partial: bool,
    pub errors: Vec<StageError>,
    pub processed_at: DateTime<Utc>,
}
