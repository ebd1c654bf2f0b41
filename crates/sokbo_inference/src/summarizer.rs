use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use sokbo_core::{
    Article, ChatMessage, Clock, Error, Language, LlmClient, Result, SummarizedArticle,
};

const SYSTEM_PROMPT_EN: &str = "You are a news summarization assistant. Produce a faithful, \
neutral summary in English. 3-5 sentences. Do not invent facts.";

const SYSTEM_PROMPT_KO: &str = "너는 뉴스 요약 어시스턴트야. 사용자가 제공한 기사를 한국어로 \
충실하고 중립적으로 요약해줘. 3-5문장으로 작성하고 사실을 지어내지 마.";

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.3;

/// Window length for the prompt-leak check.
const LEAK_WINDOW: usize = 20;

/// Summarizes one article through the LLM with retries on transient failures
/// and validation of the returned text.
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    clock: Arc<dyn Clock>,
    model: String,
    body_soft_cap: usize,
    body_hard_cap: usize,
}

impl Summarizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        model: impl Into<String>,
        body_soft_cap: usize,
        body_hard_cap: usize,
    ) -> Self {
        Self {
            llm,
            clock,
            model: model.into(),
            body_soft_cap,
            body_hard_cap,
        }
    }

    pub async fn summarize(
        &self,
        article: &Article,
        language: Language,
        custom_prompt: Option<&str>,
        deadline: Duration,
    ) -> Result<SummarizedArticle> {
        if article.body.is_empty() {
            return Err(Error::InputTooLarge("article body is empty".to_string()));
        }

        let system = match language {
            Language::Ko => SYSTEM_PROMPT_KO,
            Language::En => SYSTEM_PROMPT_EN,
        };
        let body = truncate_body(&article.body, self.body_soft_cap, self.body_hard_cap);
        let user = match custom_prompt {
            Some(prompt) if !prompt.trim().is_empty() => {
                format!("{}\n\n{}", prompt.trim(), body)
            }
            _ => body,
        };
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];

        let started = tokio::time::Instant::now();
        let mut attempt = 0u32;
        let mut invalid_retried = false;
        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(Error::Timeout(format!(
                    "summary of {} exceeded its deadline",
                    article.url
                )));
            }

            attempt += 1;
            match self
                .llm
                .chat(&messages, &self.model, MAX_TOKENS, TEMPERATURE, remaining)
                .await
            {
                Ok(raw) => {
                    let summary = raw.trim().to_string();
                    match validate_summary(&summary, &article.body, system) {
                        Ok(()) => {
                            debug!(url = %article.url, chars = summary.chars().count(), "summary accepted");
                            return Ok(SummarizedArticle {
                                article: article.clone(),
                                summary,
                                language,
                                model: self.model.clone(),
                                produced_at: self.clock.now(),
                            });
                        }
                        Err(reason) => {
                            if invalid_retried {
                                return Err(Error::SummaryInvalid(reason));
                            }
                            warn!(url = %article.url, reason = %reason, "summary rejected, re-asking once");
                            invalid_retried = true;
                        }
                    }
                }
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        url = %article.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "summary attempt failed, backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff with ±20% jitter: 1s, 2s, 4s nominal.
fn backoff_delay(attempt: u32) -> Duration {
    let nominal = BASE_BACKOFF.saturating_mul(1 << (attempt - 1).min(8));
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    nominal.mul_f64(factor)
}

/// Soft cap cuts at the first sentence boundary past the cap; hard cap is
/// unconditional.
fn truncate_body(body: &str, soft_cap: usize, hard_cap: usize) -> String {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= soft_cap {
        return body.to_string();
    }
    let hard = hard_cap.min(chars.len());
    for i in soft_cap..hard {
        if matches!(chars[i], '.' | '!' | '?' | '。') {
            return chars[..=i].iter().collect();
        }
    }
    chars[..hard].iter().collect()
}

fn validate_summary(summary: &str, body: &str, system_prompt: &str) -> std::result::Result<(), String> {
    if summary.is_empty() {
        return Err("summary is empty".to_string());
    }
    if summary.chars().count() > body.chars().count() {
        return Err("summary is longer than the article body".to_string());
    }
    if leaks_prompt(summary, system_prompt) {
        return Err("summary echoes the system prompt".to_string());
    }
    Ok(())
}

/// True when any `LEAK_WINDOW`-char slice of the system prompt appears
/// verbatim in the summary.
fn leaks_prompt(summary: &str, system_prompt: &str) -> bool {
    let prompt_chars: Vec<char> = system_prompt.chars().collect();
    if prompt_chars.len() < LEAK_WINDOW {
        return summary.contains(system_prompt);
    }
    for window in prompt_chars.windows(LEAK_WINDOW) {
        let needle: String = window.iter().collect();
        if summary.contains(&needle) {
            return true;
        }
    }
    false
}
