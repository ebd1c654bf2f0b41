use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sokbo_core::{
    ChatMessage, Clock, CoreConfig, Error, FeedbackKind, FeedbackRecord, HistoryStore, Language,
    LlmClient, MailSender, PipelineRequest, Result, SystemClock,
};
use sokbo_feeds::{FeedRegistry, ReqwestHttpClient};
use sokbo_inference::OpenAiClient;
use sokbo_pipeline::NewsPipeline;
use sokbo_storage::{MemoryHistoryStore, SqliteHistoryStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Korean news summarization pipeline", long_about = None)]
struct Cli {
    /// History backend: memory or sqlite
    #[arg(long, default_value = "memory")]
    storage: String,
    /// SQLite database path (with --storage sqlite)
    #[arg(long, default_value = "./history.db")]
    db_path: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize news for a natural-language query
    Query {
        query: String,
        #[arg(long, default_value_t = 5)]
        max_articles: usize,
        #[arg(long, default_value = "ko")]
        language: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Summarize explicit RSS feeds and/or article URLs
    Urls {
        #[arg(long = "rss")]
        rss_urls: Vec<String>,
        #[arg(long = "article")]
        article_urls: Vec<String>,
        #[arg(long, default_value_t = 5)]
        max_articles: usize,
        #[arg(long, default_value = "ko")]
        language: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Show a user's summary history
    History {
        user: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
        #[arg(long)]
        language: Option<String>,
    },
    /// Compute recommendations for a user
    Recommend {
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Record feedback for a summarized article
    Feedback {
        user: String,
        article_url: String,
        rating: u8,
        #[arg(long)]
        negative: bool,
    },
    /// List the configured feed sources
    Sources,
}

/// Stands in when no LLM API key is configured. Keyword extraction falls
/// back to heuristics; summarization fails per article.
struct NoLlm;

#[async_trait]
impl LlmClient for NoLlm {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        _max_tokens: u32,
        _temperature: f32,
        _deadline: std::time::Duration,
    ) -> Result<String> {
        Err(Error::LlmUnavailable(
            "no LLM API key configured (set OPENAI_API_KEY)".to_string(),
        ))
    }
}

/// The mail transport is an external collaborator; the CLI only logs what
/// would have been sent.
struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str, text_body: &str) -> Result<()> {
        info!(to, subject, chars = text_body.len(), "digest rendered (no SMTP transport wired)");
        Ok(())
    }
}

fn parse_language(value: &str) -> Result<Language> {
    Language::parse(value)
        .ok_or_else(|| Error::InvalidRequest(format!("unsupported language: {}", value)))
}

async fn build_pipeline(cli: &Cli, config: CoreConfig) -> Result<NewsPipeline> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(FeedRegistry::curated()?);
    let http = Arc::new(ReqwestHttpClient::new()?);

    let llm: Arc<dyn LlmClient> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Arc::new(OpenAiClient::new(key)?),
        _ => {
            warn!("OPENAI_API_KEY is not set; summaries will fail, keywords fall back to heuristics");
            Arc::new(NoLlm)
        }
    };

    let store: Arc<dyn HistoryStore> = match cli.storage.as_str() {
        "memory" => Arc::new(MemoryHistoryStore::new(Arc::clone(&clock))),
        "sqlite" => Arc::new(SqliteHistoryStore::new(&cli.db_path, Arc::clone(&clock)).await?),
        other => {
            return Err(Error::Config(format!(
                "unknown storage backend: {} (available: memory, sqlite)",
                other
            )))
        }
    };

    Ok(NewsPipeline::new(
        config,
        registry,
        http,
        llm,
        store,
        Arc::new(LogMailer),
        clock,
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = CoreConfig::from_env();

    match &cli.command {
        Commands::Sources => {
            let registry = FeedRegistry::curated()?;
            for source in registry.list() {
                println!("{:<14} {:<10} {}", source.name, source.category, source.rss_url);
            }
            return Ok(());
        }
        _ => {}
    }

    let pipeline = build_pipeline(&cli, config).await?;
    match cli.command {
        Commands::Query {
            query,
            max_articles,
            language,
            user,
            email,
            prompt,
        } => {
            let request = PipelineRequest {
                query: Some(query),
                rss_urls: Vec::new(),
                article_urls: Vec::new(),
                max_articles,
                language: parse_language(&language)?,
                user_id: user,
                recipient_email: email,
                custom_prompt: prompt,
            };
            let response = pipeline.summarize_by_query(request).await?;
            print_json(&response)?;
        }
        Commands::Urls {
            rss_urls,
            article_urls,
            max_articles,
            language,
            user,
            email,
            prompt,
        } => {
            let request = PipelineRequest {
                query: None,
                rss_urls,
                article_urls,
                max_articles,
                language: parse_language(&language)?,
                user_id: user,
                recipient_email: email,
                custom_prompt: prompt,
            };
            let response = pipeline.summarize_by_rss(request).await?;
            print_json(&response)?;
        }
        Commands::History {
            user,
            page,
            per_page,
            language,
        } => {
            let language = language.as_deref().map(parse_language).transpose()?;
            let history = pipeline.history(&user, page, per_page, language).await?;
            print_json(&history)?;
        }
        Commands::Recommend { user, limit } => {
            let recommendations = pipeline.recommendations(&user, limit).await?;
            print_json(&recommendations)?;
        }
        Commands::Feedback {
            user,
            article_url,
            rating,
            negative,
        } => {
            pipeline
                .record_feedback(FeedbackRecord {
                    user_id: user,
                    article_url,
                    rating,
                    feedback_type: if negative {
                        FeedbackKind::Negative
                    } else {
                        FeedbackKind::Positive
                    },
                    created_at: chrono::Utc::now(),
                })
                .await?;
            info!("feedback recorded");
        }
        Commands::Sources => unreachable!("handled above"),
    }

    Ok(())
}
