use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;

use sokbo_core::{Error, HttpClient, HttpResponse, Result};

const ACCEPT_FEEDS: &str = "application/rss+xml, application/xml, text/xml, */*";
const ACCEPT_LANG: &str = "ko-KR,ko;q=0.9,en;q=0.8";

/// Realistic desktop user agents, rotated per request. Several Korean news
/// servers reject obvious bot agents.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, deadline: Duration) -> Result<HttpResponse> {
        let mut headers = HeaderMap::new();
        let agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANG));

        let started = tokio::time::Instant::now();
        let request = self.client.get(url).headers(headers).send();
        let response = tokio::time::timeout(deadline, request)
            .await
            .map_err(|_| Error::Timeout(format!("GET {} exceeded deadline", url)))??;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let remaining = deadline.saturating_sub(started.elapsed());
        let body = tokio::time::timeout(remaining, response.bytes())
            .await
            .map_err(|_| Error::Timeout(format!("reading body of {} exceeded deadline", url)))??;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
            content_type,
            final_url,
        })
    }
}
