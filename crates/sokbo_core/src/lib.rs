pub mod clients;
pub mod config;
pub mod error;
pub mod request;
pub mod types;

pub use clients::{ChatMessage, ChatRole, Clock, HttpClient, HttpResponse, LlmClient};
pub use clients::{HistoryStore, InsertOutcome, MailSender, SystemClock};
pub use config::CoreConfig;
pub use error::{Error, Result};
pub use request::{PipelineRequest, Stage, StageError, SummarizeResponse, SummaryItem};
pub use types::{
    Article, FeedEntry, FeedSource, FeedbackKind, FeedbackRecord, HistoryPage, HistoryRecord,
    KeywordSet, Language, LanguageHint, NewsCategory, Recommendation, RecommendationKind,
    SummarizedArticle,
};

pub mod prelude {
    pub use super::{Article, Error, FeedEntry, FeedSource, Result};
}
