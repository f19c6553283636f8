//! Study Host - the study workspace behind every front end
//!
//! This crate provides:
//! - Stable study keys shared by the cache, history and result buckets
//! - Streaming assembly of generated results into per-key buckets
//! - The tab strip with groups and multi-select
//! - Language switching with chat transcript migration
//! - [`StudyOrchestrator`], which ties them together

pub mod assembler;
pub mod events;
pub mod language;
pub mod orchestrator;
pub mod study_key;
pub mod tabs;

pub use assembler::{ResultBuckets, StreamingAssembler};
pub use events::EventBus;
pub use language::{LanguageMigrationController, LanguageSwitch};
pub use orchestrator::{StartOutcome, StudyOrchestrator};
pub use study_key::{study_key, StudyKey};
pub use tabs::{Opened, TabManager};
