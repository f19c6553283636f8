use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::result::{ChatTranscript, GuidedSession};
use shared::settings::GenerationEndpoint;
use shared::study::{KnowledgeLevel, Language, StudyItem};
use std::sync::Arc;

use crate::http::HttpGenerationClient;
use crate::{GenerationService, SectionStream, TextStream, VerseSpan};

/// Tries generation endpoints in order of preference, falling back on failure.
///
/// Fallback only happens while a call is being opened. Once a stream has been
/// handed back, its errors belong to the caller.
pub struct GenerationRouter {
    backends: Vec<(String, Arc<dyn GenerationService>)>,
}

impl GenerationRouter {
    pub fn new(backends: Vec<(String, Arc<dyn GenerationService>)>) -> Self {
        Self { backends }
    }

    pub fn from_endpoints(endpoints: &[GenerationEndpoint]) -> Self {
        let backends = endpoints
            .iter()
            .map(|endpoint| {
                let client: Arc<dyn GenerationService> =
                    Arc::new(HttpGenerationClient::from_endpoint(endpoint));
                (endpoint.name.clone(), client)
            })
            .collect();
        Self { backends }
    }

    /// Returns the name of the first configured backend.
    pub fn active_backend(&self) -> Option<&str> {
        self.backends.first().map(|(name, _)| name.as_str())
    }

    async fn first_ok<'a, T, F>(&'a self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut(&'a dyn GenerationService) -> BoxFuture<'a, Result<T>>,
    {
        let mut last_error = None;

        for (name, backend) in &self.backends {
            match call(backend.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(backend = %name, operation, error = %e, "generation backend failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No generation endpoints configured")))
    }
}

#[async_trait]
impl GenerationService for GenerationRouter {
    async fn stream_sections(
        &self,
        item: &StudyItem,
        language: Language,
    ) -> Result<SectionStream> {
        self.first_ok("sections", |b| b.stream_sections(item, language))
            .await
    }

    async fn stream_chat(
        &self,
        transcript: &ChatTranscript,
        subject: &str,
        language: Language,
    ) -> Result<TextStream> {
        self.first_ok("chat", |b| b.stream_chat(transcript, subject, language))
            .await
    }

    async fn is_relevant(&self, text: &str, language: Language) -> Result<bool> {
        self.first_ok("relevance", |b| b.is_relevant(text, language))
            .await
    }

    async fn fetch_guided_session(
        &self,
        level: KnowledgeLevel,
        number: u32,
        language: Language,
        prior_titles: &[String],
    ) -> Result<GuidedSession> {
        self.first_ok("guided_session", |b| {
            b.fetch_guided_session(level, number, language, prior_titles)
        })
        .await
    }

    async fn fetch_guided_introduction(
        &self,
        level: KnowledgeLevel,
        language: Language,
    ) -> Result<String> {
        self.first_ok("guided_introduction", |b| {
            b.fetch_guided_introduction(level, language)
        })
        .await
    }

    async fn locate_passage(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
        language: Language,
    ) -> Result<VerseSpan> {
        self.first_ok("locate_passage", |b| {
            b.locate_passage(book, chapter, verse, language)
        })
        .await
    }
}
