use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No keywords could be extracted from the query")]
    KeywordEmpty,

    #[error("No articles could be summarized")]
    NoResults,

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limited")]
    RateLimited,

    #[error("upstream responded with status {0}: {1}")]
    UpstreamStatus(u16, String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Summary rejected: {0}")]
    SummaryInvalid(String),

    #[error("Input too large: {0}")]
    InputTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Short machine-readable class name, used in per-item stage errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Http(_) => "network_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Config(_) => "config",
            Error::KeywordEmpty => "keyword_empty",
            Error::NoResults => "no_results",
            Error::LlmUnavailable(_) => "llm_unavailable",
            Error::RateLimited => "rate_limited",
            Error::UpstreamStatus(_, _) => "upstream_status",
            Error::Timeout(_) => "timeout",
            Error::SummaryInvalid(_) => "summary_invalid",
            Error::InputTooLarge(_) => "input_too_large",
            Error::Storage(_) => "store_unavailable",
            Error::Mail(_) => "mail_error",
            Error::External(_) => "external",
        }
    }

    /// Transient errors are worth retrying; everything else is permanent.
    /// Deadline expiry is deliberately permanent: retrying cannot buy time
    /// back.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RateLimited => true,
            Error::LlmUnavailable(_) => true,
            Error::UpstreamStatus(status, _) => (500..600).contains(status),
            Error::Http(e) => !e.is_status() || e.status().map_or(true, |s| s.is_server_error()),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
