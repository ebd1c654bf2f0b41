use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::types::{FeedbackRecord, HistoryPage, HistoryRecord, Language, NewsCategory};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a chat completion request and returns the assistant text.
    /// Implementations must surface transient failures (network, 5xx, rate
    /// limits) through `Error` variants where `is_transient()` is true.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        max_tokens: u32,
        temperature: f32,
        deadline: Duration,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a GET and returns the raw bytes so callers can do their own
    /// charset detection.
    async fn get(&self, url: &str, deadline: Duration) -> Result<HttpResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(String),
    DuplicateIgnored,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Inserts a record; duplicates on (user, url, second) are ignored.
    async fn insert(&self, record: &HistoryRecord) -> Result<InsertOutcome>;

    /// Pages are 1-indexed, newest first, `per_page` capped at 100.
    async fn list(
        &self,
        user_id: &str,
        page: u32,
        per_page: u32,
        language: Option<Language>,
    ) -> Result<HistoryPage>;

    /// Keyword frequencies over the user's recent history.
    async fn keywords_of_user(&self, user_id: &str, since_days: i64) -> Result<Vec<(String, u64)>>;

    /// Category frequencies over the user's recent history.
    async fn categories_of_user(
        &self,
        user_id: &str,
        since_days: i64,
    ) -> Result<Vec<(NewsCategory, u64)>>;

    /// Every article URL the user has ever been shown a summary for.
    async fn urls_of_user(&self, user_id: &str) -> Result<HashSet<String>>;

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()>;

    async fn insert_recommendation_click(
        &self,
        user_id: &str,
        article_url: &str,
        clicked_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str, text_body: &str) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
