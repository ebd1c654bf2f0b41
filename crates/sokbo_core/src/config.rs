use std::time::Duration;

/// Runtime knobs for the pipeline, loaded once at startup and passed in.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub feed_parallelism: usize,
    pub article_parallelism: usize,
    pub llm_parallelism: usize,
    pub fetch_timeout: Duration,
    pub extract_timeout: Duration,
    pub llm_timeout: Duration,
    pub request_deadline: Duration,
    pub max_articles_hard: usize,
    pub body_soft_cap: usize,
    pub body_hard_cap: usize,
    pub idempotency_window: Duration,
    pub idempotency_capacity: usize,
    pub recommendation_window_days: i64,
    pub llm_model: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            feed_parallelism: 8,
            article_parallelism: 6,
            llm_parallelism: 3,
            fetch_timeout: Duration::from_secs(15),
            extract_timeout: Duration::from_secs(20),
            llm_timeout: Duration::from_secs(60),
            request_deadline: Duration::from_secs(300),
            max_articles_hard: 50,
            body_soft_cap: 4000,
            body_hard_cap: 6000,
            idempotency_window: Duration::from_secs(60),
            idempotency_capacity: 256,
            recommendation_window_days: 30,
            llm_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

impl CoreConfig {
    /// Overrides defaults from the environment; unknown or malformed values
    /// keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_usize("FEED_PARALLELISM") {
            config.feed_parallelism = n.max(1);
        }
        if let Some(n) = env_usize("ARTICLE_PARALLELISM") {
            config.article_parallelism = n.max(1);
        }
        if let Some(n) = env_usize("LLM_PARALLELISM") {
            config.llm_parallelism = n.max(1);
        }
        if let Some(secs) = env_usize("FETCH_TIMEOUT") {
            config.fetch_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_usize("EXTRACT_TIMEOUT") {
            config.extract_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_usize("LLM_TIMEOUT") {
            config.llm_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_usize("REQUEST_DEADLINE") {
            config.request_deadline = Duration::from_secs(secs as u64);
        }
        if let Some(n) = env_usize("MAX_ARTICLES_HARD") {
            config.max_articles_hard = n.max(1);
        }
        if let Some(n) = env_usize("BODY_SOFT_CAP") {
            config.body_soft_cap = n;
        }
        if let Some(n) = env_usize("BODY_HARD_CAP") {
            config.body_hard_cap = n;
        }
        if let Some(secs) = env_usize("IDEMPOTENCY_WINDOW") {
            config.idempotency_window = Duration::from_secs(secs as u64);
        }
        if let Some(days) = env_usize("RECOMMENDATION_WINDOW_DAYS") {
            config.recommendation_window_days = days as i64;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                config.llm_model = model;
            }
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoreConfig::default();
        assert_eq!(config.feed_parallelism, 8);
        assert_eq!(config.article_parallelism, 6);
        assert_eq!(config.llm_parallelism, 3);
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.request_deadline, Duration::from_secs(300));
        assert_eq!(config.max_articles_hard, 50);
        assert_eq!(config.idempotency_capacity, 256);
        assert_eq!(config.llm_model, "gpt-3.5-turbo");
    }
}
