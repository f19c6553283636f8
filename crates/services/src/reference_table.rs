//! Canonical book/chapter/verse table and passage arithmetic.
//!
//! The table itself is static data loaded from JSON:
//!
//! ```json
//! [{ "name": "Genesis", "verses": [31, 25, 24] }]
//! ```
//!
//! where `verses[i]` is the verse count of chapter `i + 1`. Books are listed
//! in canonical order; next/previous passage navigation walks that order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::error::StudyError;
use shared::study::StudyItem;
use std::path::Path;

/// A contiguous verse range inside one chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub book: String,
    pub chapter: u32,
    pub start_verse: u32,
    pub end_verse: u32,
}

impl Passage {
    pub fn new(book: impl Into<String>, chapter: u32, start_verse: u32, end_verse: u32) -> Self {
        Self {
            book: book.into(),
            chapter,
            start_verse,
            end_verse,
        }
    }

    pub fn from_item(item: &StudyItem) -> Option<Self> {
        match item {
            StudyItem::Reference {
                book,
                chapter,
                start_verse,
                end_verse,
            } => Some(Self::new(book.clone(), *chapter, *start_verse, *end_verse)),
            _ => None,
        }
    }

    pub fn to_item(&self) -> StudyItem {
        StudyItem::reference(self.book.clone(), self.chapter, self.start_verse, self.end_verse)
    }

    /// Number of verses covered
    pub fn span(&self) -> u32 {
        self.end_verse.saturating_sub(self.start_verse) + 1
    }
}

pub trait ReferenceTable: Send + Sync {
    /// Book names in canonical order
    fn books(&self) -> Vec<String>;

    fn chapter_count(&self, book: &str) -> Option<u32>;

    fn verse_count(&self, book: &str, chapter: u32) -> Option<u32>;

    /// Canonical spelling of `name`, matched case-insensitively.
    fn canonical_book(&self, name: &str) -> Option<String> {
        let name = name.trim();
        self.books()
            .into_iter()
            .find(|book| book.eq_ignore_ascii_case(name))
    }

    fn validate(&self, passage: &Passage) -> shared::Result<()> {
        let invalid = |reason: String| Err(StudyError::InvalidReference(reason));

        let Some(chapters) = self.chapter_count(&passage.book) else {
            return invalid(format!("unknown book \"{}\"", passage.book));
        };
        if passage.chapter == 0 || passage.chapter > chapters {
            return invalid(format!(
                "{} has {} chapters, not {}",
                passage.book, chapters, passage.chapter
            ));
        }
        let verses = self.verse_count(&passage.book, passage.chapter).unwrap_or(0);
        if passage.start_verse == 0 || passage.start_verse > passage.end_verse {
            return invalid(format!(
                "verse range {}-{} is empty",
                passage.start_verse, passage.end_verse
            ));
        }
        if passage.end_verse > verses {
            return invalid(format!(
                "{} {} has {} verses, not {}",
                passage.book, passage.chapter, verses, passage.end_verse
            ));
        }
        Ok(())
    }

    /// The passage right after `current`, keeping its length where the
    /// chapter allows. `None` at the end of the canon.
    fn next_passage(&self, current: &Passage) -> Option<Passage> {
        let span = current.span();
        let verses = self.verse_count(&current.book, current.chapter)?;

        let (book, chapter) = if current.end_verse < verses {
            (current.book.clone(), current.chapter)
        } else if current.chapter < self.chapter_count(&current.book)? {
            (current.book.clone(), current.chapter + 1)
        } else {
            let books = self.books();
            let index = books.iter().position(|b| b == &current.book)?;
            (books.get(index + 1)?.clone(), 1)
        };

        let start_verse = if chapter == current.chapter && book == current.book {
            current.end_verse + 1
        } else {
            1
        };
        let last = self.verse_count(&book, chapter)?;
        let end_verse = (start_verse + span - 1).min(last);
        Some(Passage::new(book, chapter, start_verse, end_verse))
    }

    /// The passage right before `current`. `None` at the start of the canon.
    fn previous_passage(&self, current: &Passage) -> Option<Passage> {
        let span = current.span();

        if current.start_verse > 1 {
            let end_verse = current.start_verse - 1;
            let start_verse = end_verse.saturating_sub(span - 1).max(1);
            return Some(Passage::new(current.book.clone(), current.chapter, start_verse, end_verse));
        }

        let (book, chapter) = if current.chapter > 1 {
            (current.book.clone(), current.chapter - 1)
        } else {
            let books = self.books();
            let index = books.iter().position(|b| b == &current.book)?;
            let previous = books.get(index.checked_sub(1)?)?.clone();
            let last_chapter = self.chapter_count(&previous)?;
            (previous, last_chapter)
        };

        let end_verse = self.verse_count(&book, chapter)?;
        let start_verse = end_verse.saturating_sub(span - 1).max(1);
        Some(Passage::new(book, chapter, start_verse, end_verse))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookEntry {
    name: String,
    verses: Vec<u32>,
}

/// In-memory table loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceTable {
    books: Vec<BookEntry>,
}

impl StaticReferenceTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(book, verse counts per chapter)` pairs in canonical order.
    pub fn from_books<I, S>(books: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u32>)>,
        S: Into<String>,
    {
        Self {
            books: books
                .into_iter()
                .map(|(name, verses)| BookEntry {
                    name: name.into(),
                    verses,
                })
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let books: Vec<BookEntry> =
            serde_json::from_str(json).context("reference table is not valid JSON")?;
        Ok(Self { books })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reference table {}", path.display()))?;
        let table = Self::from_json(&contents)?;
        tracing::info!(books = table.books.len(), path = %path.display(), "loaded reference table");
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    fn book(&self, name: &str) -> Option<&BookEntry> {
        self.books.iter().find(|b| b.name == name)
    }
}

impl ReferenceTable for StaticReferenceTable {
    fn books(&self) -> Vec<String> {
        self.books.iter().map(|b| b.name.clone()).collect()
    }

    fn chapter_count(&self, book: &str) -> Option<u32> {
        self.book(book).map(|b| b.verses.len() as u32)
    }

    fn verse_count(&self, book: &str, chapter: u32) -> Option<u32> {
        let index = chapter.checked_sub(1)? as usize;
        self.book(book)?.verses.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StaticReferenceTable {
        StaticReferenceTable::from_books([
            ("Genesis", vec![31, 25]),
            ("Exodus", vec![22]),
            ("Malachi", vec![14, 17]),
        ])
    }

    #[test]
    fn test_validate() {
        let t = table();
        assert!(t.validate(&Passage::new("Genesis", 1, 1, 1)).is_ok());
        assert!(t.validate(&Passage::new("Genesis", 3, 1, 1)).is_err());
        assert!(t.validate(&Passage::new("Genesis", 2, 20, 26)).is_err());
        assert!(t.validate(&Passage::new("Genesis", 1, 5, 4)).is_err());
        assert!(t.validate(&Passage::new("Tobit", 1, 1, 1)).is_err());
    }

    #[test]
    fn test_next_within_chapter_keeps_span() {
        let next = table().next_passage(&Passage::new("Genesis", 1, 1, 3)).unwrap();
        assert_eq!(next, Passage::new("Genesis", 1, 4, 6));
    }

    #[test]
    fn test_next_clamps_to_chapter_end() {
        let next = table().next_passage(&Passage::new("Genesis", 1, 25, 28)).unwrap();
        assert_eq!(next, Passage::new("Genesis", 1, 29, 31));
    }

    #[test]
    fn test_next_crosses_chapter_and_book() {
        let t = table();
        assert_eq!(
            t.next_passage(&Passage::new("Genesis", 1, 30, 31)).unwrap(),
            Passage::new("Genesis", 2, 1, 2)
        );
        assert_eq!(
            t.next_passage(&Passage::new("Genesis", 2, 25, 25)).unwrap(),
            Passage::new("Exodus", 1, 1, 1)
        );
    }

    #[test]
    fn test_canon_boundaries() {
        let t = table();
        assert!(t.next_passage(&Passage::new("Malachi", 2, 17, 17)).is_none());
        assert!(t.previous_passage(&Passage::new("Genesis", 1, 1, 2)).is_none());
    }

    #[test]
    fn test_previous_crosses_book() {
        let t = table();
        assert_eq!(
            t.previous_passage(&Passage::new("Exodus", 1, 1, 2)).unwrap(),
            Passage::new("Genesis", 2, 24, 25)
        );
        assert_eq!(
            t.previous_passage(&Passage::new("Genesis", 1, 2, 4)).unwrap(),
            Passage::new("Genesis", 1, 1, 1)
        );
    }

    #[test]
    fn test_from_json_and_canonical_book() {
        let t = StaticReferenceTable::from_json(r#"[{"name":"Ruth","verses":[22,23,18,22]}]"#)
            .unwrap();
        assert_eq!(t.chapter_count("Ruth"), Some(4));
        assert_eq!(t.verse_count("Ruth", 3), Some(18));
        assert_eq!(t.verse_count("Ruth", 0), None);
        assert_eq!(t.canonical_book("ruth").as_deref(), Some("Ruth"));
    }
}
