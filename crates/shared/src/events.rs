//! Events published by the orchestrator for observers (UI, logs, tests).

use serde::{Deserialize, Serialize};

use crate::result::StudyResult;
use crate::study::{Language, StudyItem};

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Message meant to be shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Study lifecycle event for real-time updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StudyEvent {
    /// Generation was dispatched for a study
    Started { key: String, item: StudyItem },
    /// The accumulator for `key` changed
    Snapshot { key: String, result: StudyResult },
    /// Generation finished and the result was cached
    Completed { key: String },
    /// Generation failed and the partial result was discarded
    Failed { key: String, error: String },
    /// The display language changed
    LanguageChanged { from: Language, to: Language },
    Notice(Notice),
}

impl StudyEvent {
    pub fn key(&self) -> Option<&str> {
        match self {
            StudyEvent::Started { key, .. }
            | StudyEvent::Snapshot { key, .. }
            | StudyEvent::Completed { key }
            | StudyEvent::Failed { key, .. } => Some(key),
            StudyEvent::LanguageChanged { .. } | StudyEvent::Notice(_) => None,
        }
    }
}
