pub mod charset;
pub mod extractor;
pub mod fetcher;
pub mod http;
pub mod registry;
pub mod text;

pub use extractor::{ArticleExtractor, ExtractionFailure};
pub use fetcher::{FeedFetcher, FetchOutcome};
pub use http::ReqwestHttpClient;
pub use registry::FeedRegistry;

pub mod prelude {
    pub use super::registry::FeedRegistry;
    pub use sokbo_core::{Article, Error, FeedEntry, FeedSource, Result};
}
