//! Generation-service clients.
//!
//! The workspace talks to the text-generation service only through
//! [`GenerationService`]. Structured studies arrive as an ordered stream of
//! named sections, chat replies as an ordered stream of text deltas.
//!
//! Contract for the streaming calls: if the request fails *before* the
//! stream is handed back, the call returns `Err` (which lets the router fall
//! back to the next endpoint). Once streaming has started, failures arrive
//! as an `Err` item inside the stream.

pub mod http;
pub mod router;
pub mod scripted;
pub mod sse;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use shared::result::{ChatTranscript, GuidedSession, SectionChunk};
use shared::study::{KnowledgeLevel, Language, StudyItem};

/// Ordered named sections of one structured study
pub type SectionStream = BoxStream<'static, Result<SectionChunk>>;

/// Ordered text deltas of one chat reply
pub type TextStream = BoxStream<'static, Result<String>>;

/// Verse span located around a single verse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseSpan {
    pub start_verse: u32,
    pub end_verse: u32,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Stream the sections of a reference/topic/question/event/story-arc study.
    async fn stream_sections(&self, item: &StudyItem, language: Language)
        -> Result<SectionStream>;

    /// Stream the next model reply for a chat transcript.
    async fn stream_chat(
        &self,
        transcript: &ChatTranscript,
        subject: &str,
        language: Language,
    ) -> Result<TextStream>;

    /// Classify whether free text is a legitimate study request.
    async fn is_relevant(&self, text: &str, language: Language) -> Result<bool>;

    /// Fetch one session of a guided curriculum.
    async fn fetch_guided_session(
        &self,
        level: KnowledgeLevel,
        number: u32,
        language: Language,
        prior_titles: &[String],
    ) -> Result<GuidedSession>;

    /// Fetch the introduction text of a guided curriculum.
    async fn fetch_guided_introduction(
        &self,
        level: KnowledgeLevel,
        language: Language,
    ) -> Result<String>;

    /// Find the passage (pericope) that contains a single verse.
    async fn locate_passage(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
        language: Language,
    ) -> Result<VerseSpan>;
}
