use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use sokbo_core::{MailSender, Result, SummarizedArticle};

/// Renders a summary digest and hands it to the injected mail transport.
pub struct DigestMailer {
    sender: Arc<dyn MailSender>,
}

impl DigestMailer {
    pub fn new(sender: Arc<dyn MailSender>) -> Self {
        Self { sender }
    }

    pub async fn send_digest(
        &self,
        recipient: &str,
        articles: &[SummarizedArticle],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let subject = format!(
            "뉴스 요약 다이제스트 {} ({}건)",
            now.format("%Y-%m-%d"),
            articles.len()
        );
        let html = render_html(articles);
        let text = render_text(articles);
        self.sender.send(recipient, &subject, &html, &text).await?;
        info!(recipient, count = articles.len(), "digest mail dispatched");
        Ok(())
    }
}

fn render_html(articles: &[SummarizedArticle]) -> String {
    let mut out = String::from("<html><body><h2>오늘의 뉴스 요약</h2>\n");
    for item in articles {
        out.push_str(&format!(
            "<div style=\"margin-bottom:24px\">\n  <h3><a href=\"{url}\">{title}</a></h3>\n  <p style=\"color:#666\">{source}</p>\n  <p>{summary}</p>\n</div>\n",
            url = escape_html(&item.article.url),
            title = escape_html(&item.article.title),
            source = escape_html(&item.article.source.name),
            summary = escape_html(&item.summary),
        ));
    }
    out.push_str("</body></html>");
    out
}

fn render_text(articles: &[SummarizedArticle]) -> String {
    let mut out = String::from("오늘의 뉴스 요약\n\n");
    for item in articles {
        out.push_str(&format!(
            "{title} ({source})\n{url}\n{summary}\n\n",
            title = item.article.title,
            source = item.article.source.name,
            url = item.article.url,
            summary = item.summary,
        ));
    }
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sokbo_core::{Article, Error, FeedSource, Language, NewsCategory};
    use std::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<(String, String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MailSender for RecordingSender {
        async fn send(
            &self,
            to: &str,
            subject: &str,
            html_body: &str,
            text_body: &str,
        ) -> Result<()> {
            if self.fail {
                return Err(Error::Mail("smtp unavailable".to_string()));
            }
            self.sent.lock().unwrap().push((
                to.to_string(),
                subject.to_string(),
                html_body.to_string(),
                text_body.to_string(),
            ));
            Ok(())
        }
    }

    fn summarized(title: &str) -> SummarizedArticle {
        SummarizedArticle {
            article: Article {
                title: title.to_string(),
                url: "https://example.com/a?x=1&y=2".to_string(),
                body: "본문".to_string(),
                source: FeedSource {
                    name: "연합뉴스".to_string(),
                    category: NewsCategory::General,
                    rss_url: "https://example.com/rss".to_string(),
                },
                fetched_at: Utc::now(),
            },
            summary: "요약 <내용>".to_string(),
            language: Language::Ko,
            model: "gpt-3.5-turbo".to_string(),
            produced_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn digest_renders_both_bodies() {
        let sender = Arc::new(RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: false,
        });
        let mailer = DigestMailer::new(sender.clone());
        mailer
            .send_digest("user@example.com", &[summarized("반도체 뉴스")], Utc::now())
            .await
            .unwrap();

        let sent = sender.sent.lock().unwrap();
        let (to, subject, html, text) = &sent[0];
        assert_eq!(to, "user@example.com");
        assert!(subject.contains("1건"));
        assert!(html.contains("반도체 뉴스"));
        // HTML entities are escaped in the HTML body only.
        assert!(html.contains("요약 &lt;내용&gt;"));
        assert!(html.contains("&amp;y=2"));
        assert!(text.contains("요약 <내용>"));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let sender = Arc::new(RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let mailer = DigestMailer::new(sender);
        let err = mailer
            .send_digest("user@example.com", &[summarized("기사")], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mail(_)));
    }
}
