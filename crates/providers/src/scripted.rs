//! Deterministic in-memory generation service.
//!
//! Used by the offline mode of the CLI and throughout the test suites. Every
//! call is counted so callers can assert that a cache hit never reached the
//! generation service.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use shared::result::{ChatTranscript, GuidedSession, SectionChunk};
use shared::study::{KnowledgeLevel, Language, StudyItem, StudyMode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::{GenerationService, SectionStream, TextStream, VerseSpan};

#[derive(Default)]
struct CallCounts {
    sections: AtomicUsize,
    chat: AtomicUsize,
    relevance: AtomicUsize,
    guided_sessions: AtomicUsize,
    guided_introductions: AtomicUsize,
    locate: AtomicUsize,
}

pub struct ScriptedGenerationService {
    sections: HashMap<StudyMode, Vec<SectionChunk>>,
    chat_reply: Vec<String>,
    /// `None` makes the relevance call itself fail
    relevance: Option<bool>,
    passage: Option<VerseSpan>,
    fail_on_open: bool,
    fail_after: Option<usize>,
    fail_guided: bool,
    gate: Option<Arc<Semaphore>>,
    calls: CallCounts,
    last_chat_language: Mutex<Option<Language>>,
}

impl ScriptedGenerationService {
    pub fn new() -> Self {
        let mut sections = HashMap::new();
        for mode in [
            StudyMode::Reference,
            StudyMode::Topic,
            StudyMode::Question,
            StudyMode::Event,
            StudyMode::StoryArc,
        ] {
            let chunks = mode
                .section_order()
                .iter()
                .map(|name| SectionChunk::new(*name, json!({ "text": format!("{} ...", name) })))
                .collect();
            sections.insert(mode, chunks);
        }

        Self {
            sections,
            chat_reply: vec!["Grace and peace. ".into(), "Let us look at this together.".into()],
            relevance: Some(true),
            passage: None,
            fail_on_open: false,
            fail_after: None,
            fail_guided: false,
            gate: None,
            calls: CallCounts::default(),
            last_chat_language: Mutex::new(None),
        }
    }

    pub fn with_sections(mut self, mode: StudyMode, chunks: Vec<SectionChunk>) -> Self {
        self.sections.insert(mode, chunks);
        self
    }

    pub fn with_chat_reply(mut self, deltas: Vec<String>) -> Self {
        self.chat_reply = deltas;
        self
    }

    /// `None` makes the relevance call fail instead of answering.
    pub fn with_relevance(mut self, answer: Option<bool>) -> Self {
        self.relevance = answer;
        self
    }

    pub fn with_passage(mut self, start_verse: u32, end_verse: u32) -> Self {
        self.passage = Some(VerseSpan {
            start_verse,
            end_verse,
        });
        self
    }

    /// Fail every streaming call before the stream is returned.
    pub fn fail_on_open(mut self) -> Self {
        self.fail_on_open = true;
        self
    }

    /// Yield `n` chunks, then an error item.
    pub fn fail_stream_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn fail_guided(mut self) -> Self {
        self.fail_guided = true;
        self
    }

    /// Each streamed chunk waits for one permit from `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn section_calls(&self) -> usize {
        self.calls.sections.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.calls.chat.load(Ordering::SeqCst)
    }

    pub fn relevance_calls(&self) -> usize {
        self.calls.relevance.load(Ordering::SeqCst)
    }

    pub fn guided_session_calls(&self) -> usize {
        self.calls.guided_sessions.load(Ordering::SeqCst)
    }

    pub fn guided_introduction_calls(&self) -> usize {
        self.calls.guided_introductions.load(Ordering::SeqCst)
    }

    pub fn locate_calls(&self) -> usize {
        self.calls.locate.load(Ordering::SeqCst)
    }

    pub fn last_chat_language(&self) -> Option<Language> {
        self.last_chat_language.lock().ok().and_then(|guard| *guard)
    }

    fn script<T: Send + 'static>(&self, items: Vec<T>) -> futures::stream::BoxStream<'static, Result<T>> {
        let mut scripted: Vec<Result<T>> = Vec::with_capacity(items.len() + 1);
        match self.fail_after {
            Some(n) => {
                scripted.extend(items.into_iter().take(n).map(Ok));
                scripted.push(Err(anyhow!("scripted stream failure")));
            }
            None => scripted.extend(items.into_iter().map(Ok)),
        }

        let gate = self.gate.clone();
        stream::iter(scripted)
            .then(move |item| {
                let gate = gate.clone();
                async move {
                    if let Some(gate) = gate {
                        if let Ok(permit) = gate.acquire().await {
                            permit.forget();
                        }
                    }
                    item
                }
            })
            .boxed()
    }
}

impl Default for ScriptedGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerationService {
    async fn stream_sections(
        &self,
        item: &StudyItem,
        _language: Language,
    ) -> Result<SectionStream> {
        self.calls.sections.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_open {
            return Err(anyhow!("scripted connection failure"));
        }
        let chunks = self.sections.get(&item.mode()).cloned().unwrap_or_default();
        Ok(self.script(chunks))
    }

    async fn stream_chat(
        &self,
        _transcript: &ChatTranscript,
        _subject: &str,
        language: Language,
    ) -> Result<TextStream> {
        self.calls.chat.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_chat_language.lock() {
            *last = Some(language);
        }
        if self.fail_on_open {
            return Err(anyhow!("scripted connection failure"));
        }
        Ok(self.script(self.chat_reply.clone()))
    }

    async fn is_relevant(&self, _text: &str, _language: Language) -> Result<bool> {
        self.calls.relevance.fetch_add(1, Ordering::SeqCst);
        self.relevance
            .ok_or_else(|| anyhow!("scripted classifier unavailable"))
    }

    async fn fetch_guided_session(
        &self,
        level: KnowledgeLevel,
        number: u32,
        _language: Language,
        prior_titles: &[String],
    ) -> Result<GuidedSession> {
        self.calls.guided_sessions.fetch_add(1, Ordering::SeqCst);
        if self.fail_guided {
            return Err(anyhow!("scripted guided failure"));
        }
        Ok(GuidedSession {
            number,
            title: format!("Session {}", number),
            content: json!({
                "level": level.as_str(),
                "builds_on": prior_titles,
            }),
        })
    }

    async fn fetch_guided_introduction(
        &self,
        level: KnowledgeLevel,
        _language: Language,
    ) -> Result<String> {
        self.calls.guided_introductions.fetch_add(1, Ordering::SeqCst);
        if self.fail_guided {
            return Err(anyhow!("scripted guided failure"));
        }
        Ok(format!("Welcome to the {} curriculum.", level.as_str()))
    }

    async fn locate_passage(
        &self,
        _book: &str,
        _chapter: u32,
        _verse: u32,
        _language: Language,
    ) -> Result<VerseSpan> {
        self.calls.locate.fetch_add(1, Ordering::SeqCst);
        self.passage
            .ok_or_else(|| anyhow!("scripted passage lookup failure"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_default_script_follows_section_order() {
        let service = ScriptedGenerationService::new();
        let item = StudyItem::reference("Genesis", 1, 1, 1);
        let chunks: Vec<SectionChunk> = service
            .stream_sections(&item, Language::English)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let names: Vec<&str> = chunks.iter().map(|c| c.section.as_str()).collect();
        assert_eq!(names, StudyMode::Reference.section_order());
    }

    #[tokio::test]
    async fn test_fail_after() {
        let service = ScriptedGenerationService::new().fail_stream_after(1);
        let stream = service
            .stream_sections(&StudyItem::topic("grace"), Language::English)
            .await
            .unwrap();
        let items: Vec<Result<SectionChunk>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
