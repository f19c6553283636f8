//! The study workspace coordinator.
//!
//! [`StudyOrchestrator`] owns the tab strip, the per-key result buckets, the
//! result cache and the history log, and is the only thing that mutates them.
//! It is cheap to clone; clones share the same workspace.
//!
//! At most one primary operation (a structured study, a guided fetch or a
//! chat reply) runs at a time. Starting another one while it is in flight is
//! rejected with [`StudyError::Busy`]. Tab operations are always allowed,
//! including closing the tab whose study is still streaming.

use parking_lot::Mutex;
use providers::GenerationService;
use services::{HistoryLog, KvStore, Passage, ReferenceTable, ResultCache};
use shared::error::{Result, StudyError};
use shared::events::{Notice, StudyEvent};
use shared::result::{ChatMessage, ChatTranscript, GuidedPlan, StudyResult};
use shared::settings::{AppSettings, CurriculumSettings};
use shared::study::{Language, StudyItem, StudyMode};
use shared::tabs::Tab;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::assembler::{ResultBuckets, StreamingAssembler};
use crate::events::EventBus;
use crate::language::{LanguageMigrationController, LanguageSwitch};
use crate::study_key::{study_key, StudyKey};
use crate::tabs::TabManager;

/// How `start_study` satisfied a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Already open in a tab, which is now active
    Focused { tab: usize, sub: usize },
    /// Served from the result cache without generation
    Cached,
    /// Generated by the generation service
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimaryOperation {
    Study,
    Guided,
    Chat,
}

impl PrimaryOperation {
    fn for_item(item: &StudyItem) -> Self {
        match item.mode() {
            StudyMode::Chat => PrimaryOperation::Chat,
            StudyMode::Systematic => PrimaryOperation::Guided,
            _ => PrimaryOperation::Study,
        }
    }
}

struct Workspace {
    tabs: TabManager,
    language: Language,
    in_flight: Option<PrimaryOperation>,
    last_error: Option<String>,
}

struct Inner {
    workspace: Mutex<Workspace>,
    buckets: ResultBuckets,
    cache: Arc<Mutex<ResultCache>>,
    history: Mutex<HistoryLog>,
    generator: Arc<dyn GenerationService>,
    references: Arc<dyn ReferenceTable>,
    assembler: StreamingAssembler,
    language: LanguageMigrationController,
    events: EventBus,
    curriculum: CurriculumSettings,
}

/// Clears the in-flight flag when the primary operation ends, however it ends.
struct PrimaryGuard<'a> {
    workspace: &'a Mutex<Workspace>,
}

impl Drop for PrimaryGuard<'_> {
    fn drop(&mut self) {
        self.workspace.lock().in_flight = None;
    }
}

#[derive(Clone)]
pub struct StudyOrchestrator {
    inner: Arc<Inner>,
}

impl StudyOrchestrator {
    pub fn new(
        settings: &AppSettings,
        generator: Arc<dyn GenerationService>,
        store: Arc<dyn KvStore>,
        references: Arc<dyn ReferenceTable>,
    ) -> Self {
        let language_controller = LanguageMigrationController::new(store.clone());
        let language = language_controller
            .stored_preference()
            .unwrap_or(settings.language);

        let cache = Arc::new(Mutex::new(ResultCache::load(
            store.clone(),
            settings.cache_capacity,
        )));
        let history = HistoryLog::load(store, settings.history_capacity);
        let buckets = ResultBuckets::new();
        let events = EventBus::new();
        let assembler = StreamingAssembler::new(
            generator.clone(),
            buckets.clone(),
            cache.clone(),
            events.clone(),
        );

        tracing::info!(
            language = %language,
            cached = cache.lock().len(),
            history = history.len(),
            "study workspace ready"
        );

        Self {
            inner: Arc::new(Inner {
                workspace: Mutex::new(Workspace {
                    tabs: TabManager::new(),
                    language,
                    in_flight: None,
                    last_error: None,
                }),
                buckets,
                cache,
                history: Mutex::new(history),
                generator,
                references,
                assembler,
                language: language_controller,
                events,
                curriculum: settings.curriculum.clone(),
            }),
        }
    }

    // ── Primary operations ────────────────────────────────────────────

    /// Open a study: focus it if a tab already holds it, serve it from the
    /// cache if possible, otherwise generate it.
    pub async fn start_study(&self, item: StudyItem) -> Result<StartOutcome> {
        let outcome = self.start_study_inner(item).await;
        self.report(&outcome);
        outcome
    }

    /// Send a follow-up message in the active chat tab.
    pub async fn send_chat_message(&self, text: &str) -> Result<ChatTranscript> {
        let outcome = self.send_chat_inner(text).await;
        self.report(&outcome);
        outcome
    }

    /// Fetch the next session of the active guided plan.
    pub async fn continue_guided(&self) -> Result<GuidedPlan> {
        let outcome = self.continue_guided_inner().await;
        self.report(&outcome);
        outcome
    }

    /// Open the passage around a single verse, or the verse alone if the
    /// passage cannot be located.
    pub async fn open_verse(&self, book: &str, chapter: u32, verse: u32) -> Result<StartOutcome> {
        let outcome = self.open_verse_inner(book, chapter, verse).await;
        self.report(&outcome);
        outcome
    }

    /// Open the passage following the active reference.
    pub async fn next_passage(&self) -> Result<StartOutcome> {
        let outcome = self.step_passage(true).await;
        self.report(&outcome);
        outcome
    }

    /// Open the passage preceding the active reference.
    pub async fn previous_passage(&self) -> Result<StartOutcome> {
        let outcome = self.step_passage(false).await;
        self.report(&outcome);
        outcome
    }

    async fn start_study_inner(&self, item: StudyItem) -> Result<StartOutcome> {
        let (_guard, language) = self.acquire(PrimaryOperation::for_item(&item))?;

        if let Some(passage) = Passage::from_item(&item) {
            self.validate_passage(&passage)?;
        }

        {
            let mut workspace = self.inner.workspace.lock();
            if let Some((tab, sub)) = workspace.tabs.find(&item) {
                workspace.tabs.select(tab, sub)?;
                tracing::debug!(tab, sub, "study already open, focusing");
                return Ok(StartOutcome::Focused { tab, sub });
            }
        }

        let key = study_key(&item, language);
        let cached = self
            .inner
            .cache
            .lock()
            .get(key.as_str())
            .filter(|result| !result.is_empty())
            .cloned();
        if let Some(result) = cached {
            self.inner.history.lock().add(item.clone());
            self.inner.buckets.insert(key.clone(), result.clone());
            self.inner.workspace.lock().tabs.open(item);
            tracing::info!(key = %key, "study served from cache");
            self.inner.events.publish(StudyEvent::Snapshot {
                key: key.into_string(),
                result,
            });
            return Ok(StartOutcome::Cached);
        }

        if let Some(text) = item.free_text() {
            match self.inner.generator.is_relevant(text, language).await {
                Ok(true) => {}
                Ok(false) => return Err(StudyError::NotRelevant(text.trim().to_string())),
                Err(e) => {
                    tracing::warn!(error = %e, "relevance check failed, treating as relevant");
                }
            }
        }

        let total_sessions = match &item {
            StudyItem::Systematic { level, .. } => self.inner.curriculum.sessions_for(*level),
            _ => 0,
        };
        self.inner.history.lock().add(item.clone());
        {
            let mut workspace = self.inner.workspace.lock();
            workspace.tabs.open(item.clone());
            workspace.last_error = None;
        }
        self.inner
            .buckets
            .insert(key.clone(), StudyResult::empty_for(&item, total_sessions));
        self.inner.events.publish(StudyEvent::Started {
            key: key.to_string(),
            item: item.clone(),
        });
        tracing::info!(key = %key, "generating study");

        let assembler = &self.inner.assembler;
        match &item {
            StudyItem::Systematic { level, topic } => {
                assembler
                    .start_guided(&key, *level, topic, total_sessions, language)
                    .await?;
            }
            StudyItem::Chat { subject, .. } => {
                assembler
                    .run_chat(&key, subject, ChatTranscript::default(), None, language)
                    .await?;
            }
            StudyItem::Reference { .. }
            | StudyItem::Topic { .. }
            | StudyItem::Question { .. }
            | StudyItem::Event { .. }
            | StudyItem::StoryArc { .. } => {
                assembler.run_sections(&key, &item, language).await?;
            }
        }
        Ok(StartOutcome::Generated)
    }

    async fn send_chat_inner(&self, text: &str) -> Result<ChatTranscript> {
        let (_guard, language) = self.acquire(PrimaryOperation::Chat)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(StudyError::InvalidOperation("Message is empty".into()));
        }
        let item = self.active_item().ok_or(StudyError::WrongMode("chat"))?;
        let StudyItem::Chat { subject, .. } = &item else {
            return Err(StudyError::WrongMode("chat"));
        };

        let key = study_key(&item, language);
        let previous = self.lookup(&key).and_then(|result| result.as_chat().cloned());
        let mut transcript = previous.clone().unwrap_or_default();
        transcript.push(ChatMessage::user(text));

        self.inner
            .buckets
            .insert(key.clone(), StudyResult::Chat(transcript.clone()));
        self.inner.workspace.lock().last_error = None;
        self.inner.events.publish(StudyEvent::Started {
            key: key.to_string(),
            item: item.clone(),
        });

        self.inner
            .assembler
            .run_chat(&key, subject, transcript, previous, language)
            .await
    }

    async fn continue_guided_inner(&self) -> Result<GuidedPlan> {
        let (_guard, language) = self.acquire(PrimaryOperation::Guided)?;

        let item = self.active_item().ok_or(StudyError::WrongMode("guided"))?;
        if item.mode() != StudyMode::Systematic {
            return Err(StudyError::WrongMode("guided"));
        }
        let key = study_key(&item, language);
        let plan = self
            .lookup(&key)
            .and_then(|result| result.as_guided().cloned())
            .filter(|plan| !plan.sessions.is_empty())
            .ok_or_else(|| {
                StudyError::InvalidOperation("This guided plan has not loaded yet".into())
            })?;
        if plan.is_finished() {
            return Err(StudyError::CurriculumComplete {
                level: plan.level,
                total: plan.total_sessions,
            });
        }

        self.inner.workspace.lock().last_error = None;
        self.inner.assembler.continue_guided(&key, plan, language).await
    }

    async fn open_verse_inner(&self, book: &str, chapter: u32, verse: u32) -> Result<StartOutcome> {
        if self.is_loading() {
            return Err(StudyError::Busy);
        }
        let book = self
            .inner
            .references
            .canonical_book(book)
            .unwrap_or_else(|| book.trim().to_string());
        let single = Passage::new(book.clone(), chapter, verse, verse);
        self.validate_passage(&single)?;

        let language = self.language();
        let passage = match self
            .inner
            .generator
            .locate_passage(&book, chapter, verse, language)
            .await
        {
            Ok(span) if span.start_verse <= verse && verse <= span.end_verse => {
                let located = Passage::new(book.clone(), chapter, span.start_verse, span.end_verse);
                match self.validate_passage(&located) {
                    Ok(()) => located,
                    Err(e) => {
                        tracing::warn!(error = %e, "located passage is out of range, using the verse alone");
                        single
                    }
                }
            }
            Ok(span) => {
                tracing::warn!(?span, verse, "located passage misses the verse, using the verse alone");
                single
            }
            Err(e) => {
                tracing::warn!(error = %e, "passage lookup failed, using the verse alone");
                single
            }
        };

        self.start_study_inner(passage.to_item()).await
    }

    async fn step_passage(&self, forward: bool) -> Result<StartOutcome> {
        let item = self.active_item().ok_or(StudyError::WrongMode("reference"))?;
        let current = Passage::from_item(&item).ok_or(StudyError::WrongMode("reference"))?;
        let references = &self.inner.references;
        if references.books().is_empty() {
            return Err(StudyError::InvalidOperation(
                "No reference table is loaded".into(),
            ));
        }

        let target = if forward {
            references
                .next_passage(&current)
                .ok_or(StudyError::EndOfCanon("end"))?
        } else {
            references
                .previous_passage(&current)
                .ok_or(StudyError::EndOfCanon("beginning"))?
        };
        self.start_study_inner(target.to_item()).await
    }

    // ── Language ──────────────────────────────────────────────────────

    /// Switch the display language, migrating the active chat transcript.
    ///
    /// Rejected while a primary operation is in flight.
    pub fn change_language(&self, target: Language) -> Result<LanguageSwitch> {
        let outcome = {
            let mut workspace = self.inner.workspace.lock();
            let active = workspace.tabs.active_item().cloned();
            let current = workspace.language;
            let outcome = self.inner.language.switch(
                workspace.in_flight.is_some(),
                current,
                target,
                active.as_ref(),
                &self.inner.buckets,
                &self.inner.cache,
            );
            if outcome.is_ok() {
                workspace.language = target;
            }
            outcome.map(|switch| (current, switch))
        };

        let outcome = outcome.map(|(from, switch)| {
            if switch != LanguageSwitch::Unchanged {
                self.inner
                    .events
                    .publish(StudyEvent::LanguageChanged { from, to: target });
            }
            switch
        });
        self.report(&outcome);
        outcome
    }

    // ── Tabs ──────────────────────────────────────────────────────────

    pub fn select(&self, tab: usize, sub: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.select(tab, sub))
    }

    /// Close a tab (or one group member) and forget its studies in every
    /// language.
    pub fn close(&self, tab: usize, sub: Option<usize>) -> Result<Vec<StudyItem>> {
        self.close_with(|tabs| tabs.close(tab, sub))
    }

    pub fn close_others(&self, keep: usize, sub: Option<usize>) -> Result<Vec<StudyItem>> {
        self.close_with(|tabs| tabs.close_others(keep, sub))
    }

    pub fn close_to_right(&self, from: usize) -> Result<Vec<StudyItem>> {
        self.close_with(|tabs| tabs.close_to_right(from))
    }

    pub fn close_all(&self) -> Vec<StudyItem> {
        let removed = self.inner.workspace.lock().tabs.close_all();
        self.purge(&removed);
        removed
    }

    pub fn reorder(&self, drag: usize, drop: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.reorder(drag, drop))
    }

    pub fn create_group_from_two(&self, drag: usize, drop: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.create_group_from_two(drag, drop))
    }

    pub fn add_to_group(&self, drag: usize, group: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.add_to_group(drag, group))
    }

    pub fn ungroup(&self, group: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.ungroup(group))
    }

    pub fn remove_from_group(&self, group: usize, sub: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.remove_from_group(group, sub))
    }

    pub fn move_out_of_group(&self, group: usize, sub: usize, target: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.move_out_of_group(group, sub, target))
    }

    pub fn reorder_in_group(&self, group: usize, drag: usize, drop: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.reorder_in_group(group, drag, drop))
    }

    pub fn rename_group(&self, group: usize, name: &str) -> Result<()> {
        self.with_tabs(|tabs| tabs.rename(group, name))
    }

    pub fn enter_selection_mode(&self) {
        self.inner.workspace.lock().tabs.enter_selection_mode();
    }

    pub fn exit_selection_mode(&self) {
        self.inner.workspace.lock().tabs.exit_selection_mode();
    }

    pub fn toggle_selection(&self, index: usize) -> Result<bool> {
        self.with_tabs(|tabs| tabs.toggle_selection(index))
    }

    pub fn create_group_from_selection(&self) -> Result<()> {
        self.with_tabs(|tabs| tabs.create_group_from_selection())
    }

    pub fn add_selection_to_group(&self, group: usize) -> Result<()> {
        self.with_tabs(|tabs| tabs.add_selection_to_group(group))
    }

    // ── Observation ───────────────────────────────────────────────────

    pub fn subscribe(&self) -> UnboundedReceiver<StudyEvent> {
        self.inner.events.subscribe()
    }

    /// True while a primary operation is in flight
    pub fn is_loading(&self) -> bool {
        self.inner.workspace.lock().in_flight.is_some()
    }

    pub fn language(&self) -> Language {
        self.inner.workspace.lock().language
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.inner.workspace.lock().tabs.tabs().to_vec()
    }

    pub fn active(&self) -> Option<(usize, usize)> {
        self.inner.workspace.lock().tabs.active()
    }

    pub fn active_item(&self) -> Option<StudyItem> {
        self.inner.workspace.lock().tabs.active_item().cloned()
    }

    pub fn is_selecting(&self) -> bool {
        self.inner.workspace.lock().tabs.is_selecting()
    }

    pub fn selected(&self) -> Vec<usize> {
        self.inner.workspace.lock().tabs.selected()
    }

    /// Result for the active tab in the current language
    pub fn active_result(&self) -> Option<StudyResult> {
        let (item, language) = {
            let workspace = self.inner.workspace.lock();
            (workspace.tabs.active_item().cloned()?, workspace.language)
        };
        self.result_for(&item, language)
    }

    pub fn result_for(&self, item: &StudyItem, language: Language) -> Option<StudyResult> {
        self.lookup(&study_key(item, language))
    }

    /// Requested studies, most recent first
    pub fn history(&self) -> Vec<StudyItem> {
        self.inner.history.lock().items().to_vec()
    }

    /// Cached keys, most recent first
    pub fn cached_keys(&self) -> Vec<String> {
        self.inner
            .cache
            .lock()
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.workspace.lock().last_error.clone()
    }

    // ── Internals ─────────────────────────────────────────────────────

    /// Claim the single primary-operation slot, returning the language the
    /// operation runs in.
    fn acquire(&self, operation: PrimaryOperation) -> Result<(PrimaryGuard<'_>, Language)> {
        let mut workspace = self.inner.workspace.lock();
        if let Some(current) = workspace.in_flight {
            tracing::debug!(?current, requested = ?operation, "primary operation already in flight");
            return Err(StudyError::Busy);
        }
        workspace.in_flight = Some(operation);
        Ok((
            PrimaryGuard {
                workspace: &self.inner.workspace,
            },
            workspace.language,
        ))
    }

    fn lookup(&self, key: &StudyKey) -> Option<StudyResult> {
        self.inner
            .buckets
            .get(key)
            .or_else(|| self.inner.cache.lock().get(key.as_str()).cloned())
    }

    /// An empty table means no canonical data was loaded; references pass.
    fn validate_passage(&self, passage: &Passage) -> Result<()> {
        if self.inner.references.books().is_empty() {
            tracing::debug!(book = %passage.book, "no reference table, skipping validation");
            return Ok(());
        }
        self.inner.references.validate(passage)
    }

    fn with_tabs<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut TabManager) -> Result<T>,
    {
        let outcome = op(&mut self.inner.workspace.lock().tabs);
        self.report(&outcome);
        outcome
    }

    fn close_with<F>(&self, op: F) -> Result<Vec<StudyItem>>
    where
        F: FnOnce(&mut TabManager) -> Result<Vec<StudyItem>>,
    {
        let removed = self.with_tabs(op)?;
        self.purge(&removed);
        Ok(removed)
    }

    /// Forget closed studies: results in every language, and their history entry.
    fn purge(&self, items: &[StudyItem]) {
        if items.is_empty() {
            return;
        }
        let mut cache = self.inner.cache.lock();
        let mut history = self.inner.history.lock();
        for item in items {
            for language in Language::ALL {
                let key = study_key(item, language);
                cache.remove(key.as_str());
                self.inner.buckets.remove(&key);
            }
            history.remove(item);
        }
        tracing::debug!(count = items.len(), "closed studies purged");
    }

    /// Turn an error into a user notice; failures are also remembered.
    fn report<T>(&self, outcome: &Result<T>) {
        let Err(e) = outcome else {
            return;
        };
        if e.is_rejection() {
            self.inner.events.notice(Notice::warning(e.to_string()));
        } else {
            self.inner.workspace.lock().last_error = Some(e.to_string());
            self.inner.events.notice(Notice::error(e.to_string()));
        }
    }
}
