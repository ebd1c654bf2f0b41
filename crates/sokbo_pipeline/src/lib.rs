pub mod cache;
pub mod classify;
pub mod filter;
pub mod mailer;
pub mod manager;
pub mod recommend;

pub use manager::NewsPipeline;
pub use recommend::Recommender;

pub mod prelude {
    pub use super::{NewsPipeline, Recommender};
    pub use sokbo_core::{PipelineRequest, Result, SummarizeResponse};
}
