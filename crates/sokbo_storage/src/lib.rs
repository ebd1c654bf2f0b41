pub mod backends;

pub use backends::memory::MemoryHistoryStore;
pub use backends::sqlite::SqliteHistoryStore;

pub mod prelude {
    pub use super::{MemoryHistoryStore, SqliteHistoryStore};
    pub use sokbo_core::{HistoryRecord, HistoryStore, InsertOutcome, Result};
}
