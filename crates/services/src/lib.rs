//! Storage and static-data services behind the study orchestrator.

pub mod history_log;
pub mod kv_store;
pub mod reference_table;
pub mod result_cache;

pub use history_log::HistoryLog;
pub use kv_store::{KvStore, MemoryKvStore, SqliteKvStore};
pub use reference_table::{Passage, ReferenceTable, StaticReferenceTable};
pub use result_cache::ResultCache;
