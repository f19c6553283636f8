//! Study requests and the languages they can be generated in.
//!
//! A [`StudyItem`] is the canonical, immutable description of one request
//! for generated content. Two items describe the same study when every field
//! matches; see the hand-written [`PartialEq`] impl below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display/generation language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Spanish,
}

impl Language {
    /// Every language the workspace keeps results for.
    pub const ALL: [Language; 2] = [Language::English, Language::Spanish];

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Language::English),
            "es" | "spanish" | "español" => Some(Language::Spanish),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Español",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Knowledge level for guided (systematic) curricula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl KnowledgeLevel {
    pub fn all() -> &'static [KnowledgeLevel] {
        &[
            KnowledgeLevel::Beginner,
            KnowledgeLevel::Intermediate,
            KnowledgeLevel::Advanced,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeLevel::Beginner => "beginner",
            KnowledgeLevel::Intermediate => "intermediate",
            KnowledgeLevel::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "beginner" => Some(KnowledgeLevel::Beginner),
            "intermediate" => Some(KnowledgeLevel::Intermediate),
            "advanced" => Some(KnowledgeLevel::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for KnowledgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Study modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyMode {
    Reference,
    Topic,
    Question,
    Event,
    StoryArc,
    Chat,
    Systematic,
}

impl StudyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::Reference => "reference",
            StudyMode::Topic => "topic",
            StudyMode::Question => "qa",
            StudyMode::Event => "event",
            StudyMode::StoryArc => "storyarc",
            StudyMode::Chat => "chat",
            StudyMode::Systematic => "systematic",
        }
    }

    /// Order in which the generation service delivers sections for this mode.
    ///
    /// Chat and systematic studies are not section-streamed.
    pub fn section_order(&self) -> &'static [&'static str] {
        match self {
            StudyMode::Reference => &[
                "original_text",
                "context",
                "commentary",
                "application",
                "cross_references",
            ],
            StudyMode::Topic => &["overview", "key_passages", "theology", "application"],
            StudyMode::Question => &["answer", "supporting_passages", "perspectives"],
            StudyMode::Event => &["summary", "timeline", "participants", "significance"],
            StudyMode::StoryArc => &["overview", "episodes", "themes", "lessons"],
            StudyMode::Chat | StudyMode::Systematic => &[],
        }
    }
}

/// One canonical request for generated content
#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StudyItem {
    Reference {
        book: String,
        chapter: u32,
        start_verse: u32,
        end_verse: u32,
    },
    Topic {
        topic: String,
    },
    Question {
        question: String,
    },
    Event {
        name: String,
    },
    StoryArc {
        name: String,
    },
    Chat {
        subject: String,
        /// Distinguishes the same subject opened from different places
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    Systematic {
        level: KnowledgeLevel,
        topic: String,
    },
}

impl StudyItem {
    pub fn reference(book: impl Into<String>, chapter: u32, start_verse: u32, end_verse: u32) -> Self {
        StudyItem::Reference {
            book: book.into(),
            chapter,
            start_verse,
            end_verse,
        }
    }

    pub fn topic(topic: impl Into<String>) -> Self {
        StudyItem::Topic {
            topic: topic.into(),
        }
    }

    pub fn question(question: impl Into<String>) -> Self {
        StudyItem::Question {
            question: question.into(),
        }
    }

    pub fn chat(subject: impl Into<String>, context: Option<String>) -> Self {
        StudyItem::Chat {
            subject: subject.into(),
            context,
        }
    }

    pub fn systematic(level: KnowledgeLevel, topic: impl Into<String>) -> Self {
        StudyItem::Systematic {
            level,
            topic: topic.into(),
        }
    }

    pub fn mode(&self) -> StudyMode {
        match self {
            StudyItem::Reference { .. } => StudyMode::Reference,
            StudyItem::Topic { .. } => StudyMode::Topic,
            StudyItem::Question { .. } => StudyMode::Question,
            StudyItem::Event { .. } => StudyMode::Event,
            StudyItem::StoryArc { .. } => StudyMode::StoryArc,
            StudyItem::Chat { .. } => StudyMode::Chat,
            StudyItem::Systematic { .. } => StudyMode::Systematic,
        }
    }

    /// Free text that must pass the relevance pre-check, if this mode has one.
    pub fn free_text(&self) -> Option<&str> {
        match self {
            StudyItem::Topic { topic } => Some(topic),
            StudyItem::Question { question } => Some(question),
            StudyItem::Chat { subject, .. } => Some(subject),
            StudyItem::Reference { .. }
            | StudyItem::Event { .. }
            | StudyItem::StoryArc { .. }
            | StudyItem::Systematic { .. } => None,
        }
    }

    /// Short label for tab strips and history lists
    pub fn title(&self) -> String {
        match self {
            StudyItem::Reference {
                book,
                chapter,
                start_verse,
                end_verse,
            } => {
                if start_verse == end_verse {
                    format!("{} {}:{}", book, chapter, start_verse)
                } else {
                    format!("{} {}:{}-{}", book, chapter, start_verse, end_verse)
                }
            }
            StudyItem::Topic { topic } => topic.trim().to_string(),
            StudyItem::Question { question } => question.trim().to_string(),
            StudyItem::Event { name } | StudyItem::StoryArc { name } => name.trim().to_string(),
            StudyItem::Chat { subject, .. } => format!("Chat: {}", subject.trim()),
            StudyItem::Systematic { level, topic } => {
                format!("{} ({})", topic.trim(), level.as_str())
            }
        }
    }
}

/// Field-wise equality, spelled out per variant.
///
/// Matching on `self` keeps this exhaustive: a new variant will not compile
/// until it gets an arm here.
impl PartialEq for StudyItem {
    fn eq(&self, other: &Self) -> bool {
        match self {
            StudyItem::Reference {
                book,
                chapter,
                start_verse,
                end_verse,
            } => matches!(
                other,
                StudyItem::Reference { book: b, chapter: c, start_verse: s, end_verse: e }
                    if book == b && chapter == c && start_verse == s && end_verse == e
            ),
            StudyItem::Topic { topic } => {
                matches!(other, StudyItem::Topic { topic: t } if topic == t)
            }
            StudyItem::Question { question } => {
                matches!(other, StudyItem::Question { question: q } if question == q)
            }
            StudyItem::Event { name } => {
                matches!(other, StudyItem::Event { name: n } if name == n)
            }
            StudyItem::StoryArc { name } => {
                matches!(other, StudyItem::StoryArc { name: n } if name == n)
            }
            StudyItem::Chat { subject, context } => matches!(
                other,
                StudyItem::Chat { subject: s, context: c } if subject == s && context == c
            ),
            StudyItem::Systematic { level, topic } => matches!(
                other,
                StudyItem::Systematic { level: l, topic: t } if level == l && topic == t
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = StudyItem::reference("Genesis", 1, 1, 3);
        let b = StudyItem::reference("Genesis", 1, 1, 3);
        let c = StudyItem::reference("Genesis", 1, 1, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);

        // Same text, different mode
        assert_ne!(StudyItem::topic("grace"), StudyItem::question("grace"));

        // Context takes part in chat identity
        assert_ne!(
            StudyItem::chat("prayer", None),
            StudyItem::chat("prayer", Some("en-reference-Matthew-6-9-13".into()))
        );
    }

    #[test]
    fn test_serde_tagging() {
        let item = StudyItem::systematic(KnowledgeLevel::Beginner, "Foundations");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["mode"], "systematic");
        assert_eq!(json["level"], "beginner");

        let back: StudyItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("ES"), Some(Language::Spanish));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::English.to_string(), "en");
    }

    #[test]
    fn test_free_text_modes() {
        assert_eq!(StudyItem::topic("hope").free_text(), Some("hope"));
        assert!(StudyItem::reference("John", 3, 16, 16).free_text().is_none());
        assert!(StudyItem::Event { name: "Exodus".into() }.free_text().is_none());
    }
}
