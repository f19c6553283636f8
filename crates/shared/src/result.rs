//! Generated study results.
//!
//! Results are built incrementally while the generation service streams,
//! so every shape here tolerates being partial.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::study::{KnowledgeLevel, StudyItem, StudyMode};

/// One named piece of a result as it arrives from the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionChunk {
    pub section: String,
    pub payload: Value,
}

impl SectionChunk {
    pub fn new(section: impl Into<String>, payload: Value) -> Self {
        Self {
            section: section.into(),
            payload,
        }
    }
}

/// A named section of a structured study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub payload: Value,
}

/// Sparse section record for reference/topic/question/event/story-arc studies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionedResult {
    /// Sections in arrival order
    pub sections: Vec<Section>,
    pub complete: bool,
}

impl SectionedResult {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.payload)
    }

    /// Fold a chunk into the record.
    ///
    /// Object payloads for an existing section are merged key-wise; any other
    /// payload replaces what was there.
    pub fn merge(&mut self, chunk: SectionChunk) {
        match self.sections.iter_mut().find(|s| s.name == chunk.section) {
            Some(existing) => match (&mut existing.payload, chunk.payload) {
                (Value::Object(current), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        current.insert(k, v);
                    }
                }
                (slot, incoming) => *slot = incoming,
            },
            None => self.sections.push(Section {
                name: chunk.section,
                payload: chunk.payload,
            }),
        }
    }

    /// Fraction of the mode's known sections that have arrived
    pub fn progress(&self, mode: StudyMode) -> f32 {
        let expected = mode.section_order();
        if self.complete || expected.is_empty() {
            return if self.complete { 1.0 } else { 0.0 };
        }
        let arrived = expected
            .iter()
            .filter(|name| self.section(name).is_some())
            .count();
        arrived as f32 / expected.len() as f32
    }
}

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
    System,
}

/// A chat message within a study conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Model, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatTranscript {
    pub messages: Vec<ChatMessage>,
}

impl ChatTranscript {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append a streamed delta to the trailing model message, starting one if needed.
    pub fn append_delta(&mut self, delta: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == ChatRole::Model => last.text.push_str(delta),
            _ => self.messages.push(ChatMessage::model(delta)),
        }
    }

    pub fn last_model_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Model)
            .map(|m| m.text.as_str())
    }
}

/// One session of a guided curriculum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedSession {
    pub number: u32,
    pub title: String,
    pub content: Value,
}

/// A guided (systematic) study plan, grown one session at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedPlan {
    pub level: KnowledgeLevel,
    pub topic: String,
    pub introduction: String,
    pub sessions: Vec<GuidedSession>,
    /// Number of sessions the curriculum defines for `level`
    pub total_sessions: u32,
}

impl GuidedPlan {
    pub fn session_titles(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.title.clone()).collect()
    }

    pub fn next_session_number(&self) -> u32 {
        self.sessions.len() as u32 + 1
    }

    pub fn is_finished(&self) -> bool {
        self.sessions.len() as u32 >= self.total_sessions
    }
}

/// Accumulated result for one study key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StudyResult {
    Sections(SectionedResult),
    Chat(ChatTranscript),
    Guided(GuidedPlan),
}

impl StudyResult {
    /// The empty bucket a study starts with.
    pub fn empty_for(item: &StudyItem, total_sessions: u32) -> Self {
        match item {
            StudyItem::Chat { .. } => StudyResult::Chat(ChatTranscript::default()),
            StudyItem::Systematic { level, topic } => StudyResult::Guided(GuidedPlan {
                level: *level,
                topic: topic.clone(),
                introduction: String::new(),
                sessions: Vec::new(),
                total_sessions,
            }),
            StudyItem::Reference { .. }
            | StudyItem::Topic { .. }
            | StudyItem::Question { .. }
            | StudyItem::Event { .. }
            | StudyItem::StoryArc { .. } => StudyResult::Sections(SectionedResult::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            StudyResult::Sections(r) => r.sections.is_empty(),
            StudyResult::Chat(t) => t.messages.is_empty(),
            StudyResult::Guided(p) => p.sessions.is_empty(),
        }
    }

    pub fn as_sections(&self) -> Option<&SectionedResult> {
        match self {
            StudyResult::Sections(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatTranscript> {
        match self {
            StudyResult::Chat(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_guided(&self) -> Option<&GuidedPlan> {
        match self {
            StudyResult::Guided(p) => Some(p),
            _ => None,
        }
    }
}
