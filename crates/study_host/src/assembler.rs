//! Drives one study's generation from the first chunk to a cached result.
//!
//! Every update is addressed by [`StudyKey`], never by "the active tab", so a
//! study keeps assembling correctly while the user looks at something else.
//! Streams are not cancelled when their tab closes; late chunks recreate the
//! bucket and the finished result still lands in the cache.

use futures::StreamExt;
use parking_lot::Mutex;
use providers::GenerationService;
use services::ResultCache;
use shared::error::{Result, StudyError};
use shared::events::StudyEvent;
use shared::result::{ChatTranscript, GuidedPlan, SectionedResult, StudyResult};
use shared::study::{KnowledgeLevel, Language, StudyItem};
use std::collections::HashMap;
use std::sync::Arc;

use crate::events::EventBus;
use crate::study_key::StudyKey;

/// In-memory accumulators, one per study key
#[derive(Clone, Default)]
pub struct ResultBuckets {
    inner: Arc<Mutex<HashMap<StudyKey, StudyResult>>>,
}

impl ResultBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StudyKey) -> Option<StudyResult> {
        self.inner.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &StudyKey) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn insert(&self, key: StudyKey, result: StudyResult) {
        self.inner.lock().insert(key, result);
    }

    pub fn remove(&self, key: &StudyKey) -> Option<StudyResult> {
        self.inner.lock().remove(key)
    }

    /// Apply `apply` to the bucket for `key`, creating it from `empty` if it
    /// is missing or holds another kind of result. Returns the new snapshot.
    pub fn update<F>(&self, key: &StudyKey, empty: impl FnOnce() -> StudyResult, apply: F) -> StudyResult
    where
        F: FnOnce(&mut StudyResult),
    {
        let mut buckets = self.inner.lock();
        let bucket = buckets.entry(key.clone()).or_insert_with(empty);
        apply(bucket);
        bucket.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[derive(Clone)]
pub struct StreamingAssembler {
    generator: Arc<dyn GenerationService>,
    buckets: ResultBuckets,
    cache: Arc<Mutex<ResultCache>>,
    events: EventBus,
}

impl StreamingAssembler {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        buckets: ResultBuckets,
        cache: Arc<Mutex<ResultCache>>,
        events: EventBus,
    ) -> Self {
        Self {
            generator,
            buckets,
            cache,
            events,
        }
    }

    /// Stream the named sections of a structured study into its bucket.
    pub async fn run_sections(
        &self,
        key: &StudyKey,
        item: &StudyItem,
        language: Language,
    ) -> Result<SectionedResult> {
        let mut stream = match self.generator.stream_sections(item, language).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.discard(key, e, None)),
        };

        let empty = || StudyResult::Sections(SectionedResult::default());
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.discard(key, e, None)),
            };
            tracing::debug!(key = %key, section = %chunk.section, "section arrived");
            chunks += 1;
            let snapshot = self.buckets.update(key, empty, |bucket| match bucket {
                StudyResult::Sections(result) => result.merge(chunk),
                other => {
                    let mut result = SectionedResult::default();
                    result.merge(chunk);
                    *other = StudyResult::Sections(result);
                }
            });
            self.snapshot(key, snapshot);
        }

        let finished = self.buckets.update(key, empty, |bucket| {
            if let StudyResult::Sections(result) = bucket {
                result.complete = true;
            }
        });
        self.complete(key, finished.clone());
        tracing::info!(key = %key, chunks, "study complete");

        match finished {
            StudyResult::Sections(result) => Ok(result),
            _ => Ok(SectionedResult {
                sections: Vec::new(),
                complete: true,
            }),
        }
    }

    /// Stream the next model reply onto `transcript`.
    ///
    /// On failure the bucket goes back to `rollback`, or is removed when there
    /// was nothing before this exchange.
    pub async fn run_chat(
        &self,
        key: &StudyKey,
        subject: &str,
        transcript: ChatTranscript,
        rollback: Option<ChatTranscript>,
        language: Language,
    ) -> Result<ChatTranscript> {
        let mut stream = match self.generator.stream_chat(&transcript, subject, language).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.discard(key, e, rollback)),
        };

        let base = transcript.clone();
        let empty = move || StudyResult::Chat(base);
        let mut current = transcript;
        while let Some(delta) = stream.next().await {
            let delta = match delta {
                Ok(delta) => delta,
                Err(e) => return Err(self.discard(key, e, rollback)),
            };
            current.append_delta(&delta);
            let snapshot = self.buckets.update(key, empty.clone(), |bucket| {
                *bucket = StudyResult::Chat(current.clone());
            });
            self.snapshot(key, snapshot);
        }

        // An empty reply still closes the exchange with a model message
        if current.messages.last().map(|m| m.role) != Some(shared::result::ChatRole::Model) {
            current.append_delta("");
        }
        self.buckets.insert(key.clone(), StudyResult::Chat(current.clone()));
        self.complete(key, StudyResult::Chat(current.clone()));
        Ok(current)
    }

    /// Fetch the introduction and the first session concurrently.
    pub async fn start_guided(
        &self,
        key: &StudyKey,
        level: KnowledgeLevel,
        topic: &str,
        total_sessions: u32,
        language: Language,
    ) -> Result<GuidedPlan> {
        let (introduction, first) = tokio::join!(
            self.generator.fetch_guided_introduction(level, language),
            self.generator.fetch_guided_session(level, 1, language, &[]),
        );
        let (introduction, first) = match (introduction, first) {
            (Ok(introduction), Ok(first)) => (introduction, first),
            (Err(e), _) | (_, Err(e)) => return Err(self.discard(key, e, None)),
        };

        let plan = GuidedPlan {
            level,
            topic: topic.to_string(),
            introduction,
            sessions: vec![first],
            total_sessions,
        };
        self.buckets.insert(key.clone(), StudyResult::Guided(plan.clone()));
        self.snapshot(key, StudyResult::Guided(plan.clone()));
        self.complete(key, StudyResult::Guided(plan.clone()));
        Ok(plan)
    }

    /// Append exactly the next session to an existing plan.
    ///
    /// A failed fetch leaves the plan as it was.
    pub async fn continue_guided(
        &self,
        key: &StudyKey,
        mut plan: GuidedPlan,
        language: Language,
    ) -> Result<GuidedPlan> {
        if plan.is_finished() {
            return Err(StudyError::CurriculumComplete {
                level: plan.level,
                total: plan.total_sessions,
            });
        }

        let number = plan.next_session_number();
        let session = self
            .generator
            .fetch_guided_session(plan.level, number, language, &plan.session_titles())
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, session = number, error = %e, "guided session failed");
                self.events.publish(StudyEvent::Failed {
                    key: key.to_string(),
                    error: e.to_string(),
                });
                StudyError::Generation(e.to_string())
            })?;

        plan.sessions.push(session);
        self.buckets.insert(key.clone(), StudyResult::Guided(plan.clone()));
        self.snapshot(key, StudyResult::Guided(plan.clone()));
        self.complete(key, StudyResult::Guided(plan.clone()));
        tracing::info!(key = %key, session = number, total = plan.total_sessions, "guided session added");
        Ok(plan)
    }

    fn snapshot(&self, key: &StudyKey, result: StudyResult) {
        self.events.publish(StudyEvent::Snapshot {
            key: key.to_string(),
            result,
        });
    }

    fn complete(&self, key: &StudyKey, result: StudyResult) {
        self.cache.lock().set(key.as_str(), result);
        self.events.publish(StudyEvent::Completed {
            key: key.to_string(),
        });
    }

    /// Drop (or roll back) the partial bucket and turn `error` into the
    /// single failure the caller reports.
    fn discard(&self, key: &StudyKey, error: anyhow::Error, rollback: Option<ChatTranscript>) -> StudyError {
        match rollback {
            Some(previous) => self.buckets.insert(key.clone(), StudyResult::Chat(previous)),
            None => {
                self.buckets.remove(key);
            }
        }
        tracing::warn!(key = %key, error = %error, "generation failed");
        self.events.publish(StudyEvent::Failed {
            key: key.to_string(),
            error: error.to_string(),
        });
        StudyError::Generation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study_key::study_key;
    use providers::scripted::ScriptedGenerationService;
    use serde_json::json;
    use services::{KvStore, MemoryKvStore};
    use shared::result::{ChatMessage, ChatRole, SectionChunk};
    use shared::study::StudyMode;

    struct Harness {
        assembler: StreamingAssembler,
        buckets: ResultBuckets,
        cache: Arc<Mutex<ResultCache>>,
        events: tokio::sync::mpsc::UnboundedReceiver<StudyEvent>,
    }

    fn harness(service: ScriptedGenerationService) -> Harness {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let cache = Arc::new(Mutex::new(ResultCache::load(store, 50)));
        let buckets = ResultBuckets::new();
        let bus = EventBus::new();
        let events = bus.subscribe();
        let assembler = StreamingAssembler::new(Arc::new(service), buckets.clone(), cache.clone(), bus);
        Harness {
            assembler,
            buckets,
            cache,
            events,
        }
    }

    #[tokio::test]
    async fn test_sections_arrive_in_order_and_cache() {
        let mut h = harness(ScriptedGenerationService::new());
        let item = StudyItem::reference("Genesis", 1, 1, 1);
        let key = study_key(&item, Language::English);

        let result = h
            .assembler
            .run_sections(&key, &item, Language::English)
            .await
            .unwrap();
        assert!(result.complete);
        let names: Vec<&str> = result.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, StudyMode::Reference.section_order());

        assert!(h.cache.lock().contains(key.as_str()));

        // One snapshot per section, each holding one more section than the last
        let mut seen = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            if let StudyEvent::Snapshot { result, .. } = event {
                seen.push(result.as_sections().map(|r| r.sections.len()).unwrap_or(0));
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_stream_error_discards_bucket() {
        let h = harness(ScriptedGenerationService::new().fail_stream_after(2));
        let item = StudyItem::topic("grace");
        let key = study_key(&item, Language::English);
        h.buckets.insert(key.clone(), StudyResult::empty_for(&item, 0));

        let err = h
            .assembler
            .run_sections(&key, &item, Language::English)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::Generation(_)));
        assert!(!h.buckets.contains(&key));
        assert!(!h.cache.lock().contains(key.as_str()));
    }

    #[tokio::test]
    async fn test_repeated_section_chunks_merge() {
        let service = ScriptedGenerationService::new().with_sections(
            StudyMode::Event,
            vec![
                SectionChunk::new("summary", json!({"title": "The Exodus"})),
                SectionChunk::new("summary", json!({"body": "Israel leaves Egypt"})),
            ],
        );
        let h = harness(service);
        let item = StudyItem::Event {
            name: "Exodus".into(),
        };
        let key = study_key(&item, Language::Spanish);

        let result = h
            .assembler
            .run_sections(&key, &item, Language::Spanish)
            .await
            .unwrap();
        let summary = result.section("summary").unwrap();
        assert_eq!(summary["title"], "The Exodus");
        assert_eq!(summary["body"], "Israel leaves Egypt");
    }

    #[tokio::test]
    async fn test_chat_deltas_grow_one_message() {
        let service = ScriptedGenerationService::new()
            .with_chat_reply(vec!["Ruth ".into(), "was ".into(), "a Moabite.".into()]);
        let h = harness(service);
        let item = StudyItem::chat("Ruth", None);
        let key = study_key(&item, Language::English);

        let mut transcript = ChatTranscript::default();
        transcript.push(ChatMessage::user("Who was Ruth?"));
        let done = h
            .assembler
            .run_chat(&key, "Ruth", transcript, None, Language::English)
            .await
            .unwrap();

        assert_eq!(done.messages.len(), 2);
        assert_eq!(done.messages[1].role, ChatRole::Model);
        assert_eq!(done.last_model_text(), Some("Ruth was a Moabite."));
        assert!(h.cache.lock().contains(key.as_str()));
    }

    #[tokio::test]
    async fn test_chat_failure_rolls_back() {
        let h = harness(ScriptedGenerationService::new().fail_stream_after(1));
        let item = StudyItem::chat("Ruth", None);
        let key = study_key(&item, Language::English);

        let mut before = ChatTranscript::default();
        before.push(ChatMessage::model("Welcome."));
        let mut sending = before.clone();
        sending.push(ChatMessage::user("Tell me more"));
        h.buckets.insert(key.clone(), StudyResult::Chat(sending.clone()));

        assert!(h
            .assembler
            .run_chat(&key, "Ruth", sending, Some(before.clone()), Language::English)
            .await
            .is_err());
        assert_eq!(h.buckets.get(&key), Some(StudyResult::Chat(before)));
    }

    #[tokio::test]
    async fn test_guided_start_and_continue() {
        let service = Arc::new(ScriptedGenerationService::new());
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let cache = Arc::new(Mutex::new(ResultCache::load(store, 50)));
        let assembler = StreamingAssembler::new(
            service.clone(),
            ResultBuckets::new(),
            cache,
            EventBus::new(),
        );
        let item = StudyItem::systematic(KnowledgeLevel::Beginner, "Foundations");
        let key = study_key(&item, Language::English);

        let plan = assembler
            .start_guided(&key, KnowledgeLevel::Beginner, "Foundations", 2, Language::English)
            .await
            .unwrap();
        assert_eq!(plan.sessions.len(), 1);
        assert!(plan.introduction.contains("beginner"));
        assert_eq!(service.guided_introduction_calls(), 1);
        assert_eq!(service.guided_session_calls(), 1);

        let plan = assembler
            .continue_guided(&key, plan, Language::English)
            .await
            .unwrap();
        assert_eq!(plan.session_titles(), vec!["Session 1", "Session 2"]);
        assert_eq!(plan.sessions[1].content["builds_on"][0], "Session 1");

        let err = assembler
            .continue_guided(&key, plan, Language::English)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::CurriculumComplete { total: 2, .. }));
        assert_eq!(service.guided_session_calls(), 2);
    }

    #[tokio::test]
    async fn test_guided_start_failure_discards() {
        let h = harness(ScriptedGenerationService::new().fail_guided());
        let item = StudyItem::systematic(KnowledgeLevel::Advanced, "Covenants");
        let key = study_key(&item, Language::English);
        h.buckets.insert(key.clone(), StudyResult::empty_for(&item, 8));

        assert!(h
            .assembler
            .start_guided(&key, KnowledgeLevel::Advanced, "Covenants", 8, Language::English)
            .await
            .is_err());
        assert!(h.buckets.is_empty());
    }
}
