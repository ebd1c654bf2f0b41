use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use sokbo_core::{
    Clock, Error, FeedbackRecord, HistoryPage, HistoryRecord, HistoryStore, InsertOutcome,
    Language, NewsCategory, Result,
};

const MAX_PER_PAGE: u32 = 100;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS summary_history (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        article_url TEXT NOT NULL,
        article_title TEXT NOT NULL,
        content_excerpt TEXT NOT NULL,
        summary_text TEXT NOT NULL,
        summary_language TEXT NOT NULL,
        original_length INTEGER NOT NULL,
        summary_length INTEGER NOT NULL,
        keywords_json TEXT NOT NULL,
        category TEXT,
        created_at TEXT NOT NULL,
        created_at_sec INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_history_dedupe
    ON summary_history (user_id, article_url, created_at_sec)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_history_user_created
    ON summary_history (user_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feedback (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        article_url TEXT NOT NULL,
        rating INTEGER NOT NULL,
        feedback_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_feedback_user_created
    ON feedback (user_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS recommendation_clicks (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        article_url TEXT NOT NULL,
        clicked_at TEXT NOT NULL
    )
    "#,
];

/// History store backed by SQLite. Writes serialize through the connection
/// pool; the unique index enforces the per-second dedupe invariant.
pub struct SqliteHistoryStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteHistoryStore {
    pub async fn new(db_path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !db_path.exists() {
            std::fs::File::create(db_path)?;
        }
        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| Error::Storage("database path is not valid UTF-8".to_string()))?;
        let pool = SqlitePool::connect(&format!("sqlite:{}", db_path_str))
            .await
            .map_err(|e| Error::Storage(format!("failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::External(anyhow!("failed to run migration {}: {}", i, e)))?;
        }

        tracing::info!(path = %db_path.display(), "connected to history database");
        Ok(Self { pool, clock })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRecord> {
        let keywords: Vec<String> =
            serde_json::from_str(&row.get::<String, _>("keywords_json"))?;
        let language = Language::parse(&row.get::<String, _>("summary_language"))
            .ok_or_else(|| Error::Storage("unknown summary language in row".to_string()))?;
        let category = row
            .get::<Option<String>, _>("category")
            .as_deref()
            .and_then(NewsCategory::parse);
        let created_at = DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
            .map_err(|e| Error::Storage(format!("failed to parse created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(HistoryRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            article_url: row.get("article_url"),
            article_title: row.get("article_title"),
            content_excerpt: row.get("content_excerpt"),
            summary_text: row.get("summary_text"),
            summary_language: language,
            original_length: row.get("original_length"),
            summary_length: row.get("summary_length"),
            keywords,
            category,
            created_at,
        })
    }

    fn cutoff(&self, since_days: i64) -> String {
        (self.clock.now() - ChronoDuration::days(since_days)).to_rfc3339()
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn insert(&self, record: &HistoryRecord) -> Result<InsertOutcome> {
        let id = if record.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            record.id.clone()
        };
        let keywords_json = serde_json::to_string(&record.keywords)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO summary_history
            (id, user_id, article_url, article_title, content_excerpt, summary_text,
             summary_language, original_length, summary_length, keywords_json, category,
             created_at, created_at_sec)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.user_id)
        .bind(&record.article_url)
        .bind(&record.article_title)
        .bind(&record.content_excerpt)
        .bind(&record.summary_text)
        .bind(record.summary_language.as_str())
        .bind(record.original_length)
        .bind(record.summary_length)
        .bind(&keywords_json)
        .bind(record.category.map(|c| c.as_str()))
        .bind(record.created_at.to_rfc3339())
        .bind(record.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to insert history record: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::DuplicateIgnored)
        } else {
            Ok(InsertOutcome::Inserted(id))
        }
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
        let offset = (page as i64 - 1).saturating_mul(per_page as i64);
        let language_filter = language.map(|l| l.as_str().to_string());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM summary_history
            WHERE user_id = ? AND (? IS NULL OR summary_language = ?)
            "#,
        )
        .bind(user_id)
        .bind(&language_filter)
        .bind(&language_filter)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to count history: {}", e)))?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM summary_history
            WHERE user_id = ? AND (? IS NULL OR summary_language = ?)
            ORDER BY created_at DESC, rowid ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(&language_filter)
        .bind(&language_filter)
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to list history: {}", e)))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(Self::row_to_record(row)?);
        }
        Ok(HistoryPage {
            records,
            total: total as u64,
            page,
            per_page,
        })
    }

    async fn keywords_of_user(&self, user_id: &str, since_days: i64) -> Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            r#"
            SELECT keywords_json FROM summary_history
            WHERE user_id = ? AND created_at >= ?
            "#,
        )
        .bind(user_id)
        .bind(self.cutoff(since_days))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to load keywords: {}", e)))?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in &rows {
            let keywords: Vec<String> =
                serde_json::from_str(&row.get::<String, _>("keywords_json"))?;
            for keyword in keywords {
                *counts.entry(keyword).or_insert(0) += 1;
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
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS n FROM summary_history
            WHERE user_id = ? AND created_at >= ? AND category IS NOT NULL
            GROUP BY category
            ORDER BY n DESC, category ASC
            "#,
        )
        .bind(user_id)
        .bind(self.cutoff(since_days))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to load categories: {}", e)))?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(category) = NewsCategory::parse(&row.get::<String, _>("category")) {
                counts.push((category, row.get::<i64, _>("n") as u64));
            }
        }
        Ok(counts)
    }

    async fn urls_of_user(&self, user_id: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT article_url FROM summary_history WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to load user urls: {}", e)))?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("article_url"))
            .collect())
    }

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        feedback.validate()?;
        sqlx::query(
            r#"
            INSERT INTO feedback (id, user_id, article_url, rating, feedback_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&feedback.user_id)
        .bind(&feedback.article_url)
        .bind(feedback.rating as i64)
        .bind(match feedback.feedback_type {
            sokbo_core::FeedbackKind::Positive => "positive",
            sokbo_core::FeedbackKind::Negative => "negative",
        })
        .bind(feedback.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to insert feedback: {}", e)))?;
        Ok(())
    }

    async fn insert_recommendation_click(
        &self,
        user_id: &str,
        article_url: &str,
        clicked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_clicks (id, user_id, article_url, clicked_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(article_url)
        .bind(clicked_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to insert click: {}", e)))?;
        Ok(())
    }
}
