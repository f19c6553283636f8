use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::result::{ChatTranscript, GuidedSession};
use shared::settings::GenerationEndpoint;
use shared::study::{KnowledgeLevel, Language, StudyItem};
use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use crate::sse::sse_events;
use crate::{GenerationService, SectionStream, TextStream, VerseSpan};

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .unwrap_or_else(|_| Client::new())
});

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SectionsRequest<'a> {
    item: &'a StudyItem,
    language: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    subject: &'a str,
    language: &'static str,
    transcript: &'a ChatTranscript,
}

#[derive(Debug, Serialize)]
struct RelevanceRequest<'a> {
    text: &'a str,
    language: &'static str,
}

#[derive(Debug, Serialize)]
struct GuidedSessionRequest<'a> {
    level: KnowledgeLevel,
    session: u32,
    language: &'static str,
    prior_titles: &'a [String],
}

#[derive(Debug, Serialize)]
struct GuidedIntroRequest {
    level: KnowledgeLevel,
    language: &'static str,
}

#[derive(Debug, Serialize)]
struct LocateRequest<'a> {
    book: &'a str,
    chapter: u32,
    verse: u32,
    language: &'static str,
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RelevanceResponse {
    relevant: bool,
}

#[derive(Debug, Deserialize)]
struct IntroResponse {
    introduction: String,
}

// ── Client ───────────────────────────────────────────────────────────

/// Generation-service client speaking JSON + SSE over HTTP
pub struct HttpGenerationClient {
    http: Client,
    name: String,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpGenerationClient {
    pub fn from_endpoint(endpoint: &GenerationEndpoint) -> Self {
        // Fall back to the environment when no key is configured
        let auth_token = endpoint
            .api_key
            .clone()
            .or_else(|| env::var("STUDY_API_KEY").ok());

        Self {
            http: SHARED_HTTP.clone(),
            name: endpoint.name.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("{} error: {}", self.name, status));
            }
            return Err(anyhow!("{} error: {}\n{}", self.name, status, detail));
        }
        Ok(resp)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn stream_sections(
        &self,
        item: &StudyItem,
        language: Language,
    ) -> Result<SectionStream> {
        let req = SectionsRequest {
            item,
            language: language.code(),
        };
        let resp = self.post("/v1/studies/stream", &req).await?;
        tracing::debug!(endpoint = %self.name, mode = item.mode().as_str(), "section stream opened");

        Ok(sse_events(resp.bytes_stream())
            .map(|event| event.and_then(|e| e.into_section()))
            .boxed())
    }

    async fn stream_chat(
        &self,
        transcript: &ChatTranscript,
        subject: &str,
        language: Language,
    ) -> Result<TextStream> {
        let req = ChatRequest {
            subject,
            language: language.code(),
            transcript,
        };
        let resp = self.post("/v1/chat/stream", &req).await?;

        Ok(sse_events(resp.bytes_stream())
            .map(|event| event.and_then(|e| e.into_delta()))
            .boxed())
    }

    async fn is_relevant(&self, text: &str, language: Language) -> Result<bool> {
        let req = RelevanceRequest {
            text,
            language: language.code(),
        };
        let body: RelevanceResponse = self.post("/v1/relevance", &req).await?.json().await?;
        Ok(body.relevant)
    }

    async fn fetch_guided_session(
        &self,
        level: KnowledgeLevel,
        number: u32,
        language: Language,
        prior_titles: &[String],
    ) -> Result<GuidedSession> {
        let req = GuidedSessionRequest {
            level,
            session: number,
            language: language.code(),
            prior_titles,
        };
        let session: GuidedSession = self.post("/v1/guided/session", &req).await?.json().await?;
        Ok(session)
    }

    async fn fetch_guided_introduction(
        &self,
        level: KnowledgeLevel,
        language: Language,
    ) -> Result<String> {
        let req = GuidedIntroRequest {
            level,
            language: language.code(),
        };
        let body: IntroResponse = self
            .post("/v1/guided/introduction", &req)
            .await?
            .json()
            .await?;
        Ok(body.introduction)
    }

    async fn locate_passage(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
        language: Language,
    ) -> Result<VerseSpan> {
        let req = LocateRequest {
            book,
            chapter,
            verse,
            language: language.code(),
        };
        let span: VerseSpan = self.post("/v1/passages/locate", &req).await?.json().await?;
        Ok(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_normalised() {
        let client = HttpGenerationClient::from_endpoint(&GenerationEndpoint {
            name: "local".into(),
            base_url: "http://localhost:8787/".into(),
            api_key: Some("secret".into()),
        });
        assert_eq!(client.base_url, "http://localhost:8787");
        assert_eq!(client.name(), "local");
        assert_eq!(client.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_guided_request_body() {
        let titles = vec!["Session 1".to_string()];
        let body = serde_json::to_value(GuidedSessionRequest {
            level: KnowledgeLevel::Beginner,
            session: 2,
            language: Language::Spanish.code(),
            prior_titles: &titles,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "level": "beginner",
                "session": 2,
                "language": "es",
                "prior_titles": ["Session 1"],
            })
        );
    }
}
