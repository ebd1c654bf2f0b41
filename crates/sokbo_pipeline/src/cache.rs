use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use sokbo_core::{Clock, PipelineRequest, SummarizeResponse};

/// Replay cache for identical requests. Entries expire after the idempotency
/// window and the least recently used entry is evicted past capacity.
pub struct IdempotencyCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

struct CacheInner {
    map: HashMap<String, CachedResponse>,
    order: VecDeque<String>,
}

struct CachedResponse {
    response: SummarizeResponse,
    stored_at: DateTime<Utc>,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Stable key over user, language, query and the URL sets. URL order
    /// does not matter.
    pub fn request_key(request: &PipelineRequest) -> String {
        let mut rss: Vec<&str> = request.rss_urls.iter().map(|s| s.as_str()).collect();
        rss.sort_unstable();
        let mut articles: Vec<&str> = request.article_urls.iter().map(|s| s.as_str()).collect();
        articles.sort_unstable();
        format!(
            "{}|{}|{}|{}|{}",
            request.user_id.as_deref().unwrap_or(""),
            request.language,
            request.query.as_deref().unwrap_or(""),
            rss.join(","),
            articles.join(","),
        )
    }

    pub async fn get(&self, key: &str) -> Option<SummarizeResponse> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        self.evict_expired(&mut inner, now);

        if let Some(cached) = inner.map.get(key) {
            let response = cached.response.clone();
            // Touch: most recently used goes to the back.
            inner.order.retain(|k| k != key);
            inner.order.push_back(key.to_string());
            return Some(response);
        }
        None
    }

    pub async fn put(&self, key: String, response: SummarizeResponse) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        self.evict_expired(&mut inner, now);

        if inner.map.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        inner.map.insert(
            key.clone(),
            CachedResponse {
                response,
                stored_at: now,
            },
        );
        inner.order.push_back(key);

        while inner.map.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn evict_expired(&self, inner: &mut CacheInner, now: DateTime<Utc>) {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(60));
        inner.map.retain(|_, cached| now - cached.stored_at < ttl);
        let map = &inner.map;
        inner.order.retain(|k| map.contains_key(k));
    }
}
