pub mod keywords;
pub mod openai;
pub mod sanitize;
pub mod summarizer;

pub use keywords::KeywordExtractor;
pub use openai::OpenAiClient;
pub use summarizer::Summarizer;

pub mod prelude {
    pub use super::{KeywordExtractor, OpenAiClient, Summarizer};
    pub use sokbo_core::{ChatMessage, Error, LlmClient, Result};
}
