//! Display-language switching and chat transcript migration.
//!
//! Results are stored per language and never translated. When the active tab
//! is a chat, its transcript is carried over to the new language's key (once)
//! with a system notice, so the conversation continues where it left off.

use parking_lot::Mutex;
use services::{KvStore, ResultCache};
use shared::error::{Result, StudyError};
use shared::result::{ChatMessage, StudyResult};
use shared::study::{Language, StudyItem};
use std::sync::Arc;

use crate::assembler::ResultBuckets;
use crate::study_key::{study_key, StudyKey};

/// KV-store key holding the language preference
pub const LANGUAGE_KEY: &str = "language";

/// What a successful switch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageSwitch {
    /// Target equals the current language
    Unchanged,
    Switched {
        /// Chat transcript copied to this key, if any
        migrated: Option<StudyKey>,
    },
}

/// System message appended to a migrated transcript, in the new language.
pub fn switch_notice(language: Language) -> &'static str {
    match language {
        Language::English => "Language switched to English. Future replies will be in English.",
        Language::Spanish => "Idioma cambiado a español. Las próximas respuestas serán en español.",
    }
}

pub struct LanguageMigrationController {
    store: Arc<dyn KvStore>,
}

impl LanguageMigrationController {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Stored preference, if one was ever saved.
    pub fn stored_preference(&self) -> Option<Language> {
        match self.store.get(LANGUAGE_KEY) {
            Ok(Some(bytes)) => Language::from_code(&String::from_utf8_lossy(&bytes)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read language preference");
                None
            }
        }
    }

    /// Switch from `current` to `target`.
    ///
    /// Rejected with [`StudyError::Busy`] while a primary operation is in
    /// flight; nothing is touched in that case. The caller commits the new
    /// language once this returns `Ok`.
    pub fn switch(
        &self,
        busy: bool,
        current: Language,
        target: Language,
        active: Option<&StudyItem>,
        buckets: &ResultBuckets,
        cache: &Mutex<ResultCache>,
    ) -> Result<LanguageSwitch> {
        if busy {
            return Err(StudyError::Busy);
        }
        if current == target {
            return Ok(LanguageSwitch::Unchanged);
        }

        if let Err(e) = self.store.set(LANGUAGE_KEY, target.code().as_bytes()) {
            tracing::warn!(error = %e, "failed to persist language preference");
        }

        let migrated = match active {
            Some(item @ StudyItem::Chat { .. }) => {
                self.migrate_chat(item, current, target, buckets, cache)
            }
            _ => None,
        };

        tracing::info!(from = %current, to = %target, migrated = migrated.is_some(), "language switched");
        Ok(LanguageSwitch::Switched { migrated })
    }

    fn migrate_chat(
        &self,
        item: &StudyItem,
        current: Language,
        target: Language,
        buckets: &ResultBuckets,
        cache: &Mutex<ResultCache>,
    ) -> Option<StudyKey> {
        let old_key = study_key(item, current);
        let new_key = study_key(item, target);

        let lookup = |key: &StudyKey| {
            buckets
                .get(key)
                .or_else(|| cache.lock().get(key.as_str()).cloned())
                .filter(|result| !result.is_empty())
        };

        if lookup(&new_key).is_some() {
            return None;
        }
        let mut transcript = match lookup(&old_key)? {
            StudyResult::Chat(transcript) => transcript,
            _ => return None,
        };

        transcript.push(ChatMessage::system(switch_notice(target)));
        let migrated = StudyResult::Chat(transcript);
        buckets.insert(new_key.clone(), migrated.clone());
        cache.lock().set(new_key.as_str(), migrated);
        Some(new_key)
    }
}
