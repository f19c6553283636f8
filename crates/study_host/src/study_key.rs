//! Canonical, language-scoped identity of a study.
//!
//! Keys look like `en-reference-Genesis-1-1-1` or `es-topic-grace`. Free-text
//! fields are trimmed and lower-cased so whitespace/case variants of the same
//! request collide; reference fields are used verbatim.

use serde::{Deserialize, Serialize};
use shared::study::{Language, StudyItem};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudyKey(String);

impl StudyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StudyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StudyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn study_key(item: &StudyItem, language: Language) -> StudyKey {
    let mode = item.mode().as_str();
    let body = match item {
        StudyItem::Reference {
            book,
            chapter,
            start_verse,
            end_verse,
        } => format!("{}-{}-{}-{}", book, chapter, start_verse, end_verse),
        StudyItem::Topic { topic } => normalize(topic),
        StudyItem::Question { question } => normalize(question),
        StudyItem::Event { name } | StudyItem::StoryArc { name } => normalize(name),
        StudyItem::Chat { subject, context } => match context {
            Some(context) => format!("{}@{}", normalize(subject), context.trim()),
            None => normalize(subject),
        },
        StudyItem::Systematic { level, topic } => {
            format!("{}-{}", level.as_str(), normalize(topic))
        }
    };
    StudyKey(format!("{}-{}-{}", language.code(), mode, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::study::KnowledgeLevel;

    #[test]
    fn test_reference_key() {
        let item = StudyItem::reference("Genesis", 1, 1, 1);
        assert_eq!(
            study_key(&item, Language::English).as_str(),
            "en-reference-Genesis-1-1-1"
        );
    }

    #[test]
    fn test_free_text_normalized() {
        let a = StudyItem::topic("  Grace ");
        let b = StudyItem::topic("grace");
        assert_eq!(
            study_key(&a, Language::English),
            study_key(&b, Language::English)
        );

        let q1 = StudyItem::question("Who was Melchizedek?");
        let q2 = StudyItem::question("who was melchizedek?\n");
        assert_eq!(
            study_key(&q1, Language::Spanish),
            study_key(&q2, Language::Spanish)
        );
    }

    #[test]
    fn test_language_never_collides() {
        let items = [
            StudyItem::reference("John", 3, 16, 16),
            StudyItem::topic("hope"),
            StudyItem::Event {
                name: "Exodus".into(),
            },
            StudyItem::StoryArc {
                name: "Joseph".into(),
            },
            StudyItem::chat("prayer", None),
            StudyItem::systematic(KnowledgeLevel::Advanced, "Covenants"),
        ];
        for item in &items {
            assert_ne!(
                study_key(item, Language::English),
                study_key(item, Language::Spanish)
            );
        }
    }

    #[test]
    fn test_modes_do_not_collide() {
        assert_ne!(
            study_key(&StudyItem::topic("faith"), Language::English),
            study_key(&StudyItem::question("faith"), Language::English)
        );
        assert_ne!(
            study_key(
                &StudyItem::Event { name: "flood".into() },
                Language::English
            ),
            study_key(
                &StudyItem::StoryArc { name: "flood".into() },
                Language::English
            )
        );
    }

    #[test]
    fn test_chat_context_discriminates() {
        let plain = StudyItem::chat("Prayer", None);
        let scoped = StudyItem::chat("prayer", Some("en-reference-Matthew-6-9-13".into()));
        assert_eq!(study_key(&plain, Language::English).as_str(), "en-chat-prayer");
        assert_eq!(
            study_key(&scoped, Language::English).as_str(),
            "en-chat-prayer@en-reference-Matthew-6-9-13"
        );
    }

    #[test]
    fn test_systematic_key() {
        let item = StudyItem::systematic(KnowledgeLevel::Beginner, "Foundations");
        assert_eq!(
            study_key(&item, Language::Spanish).as_str(),
            "es-systematic-beginner-foundations"
        );
    }
}
