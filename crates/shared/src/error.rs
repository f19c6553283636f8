//! Errors surfaced by the study workspace.
//!
//! The `Display` text of each variant doubles as the notice shown to the user.

use thiserror::Error;

use crate::study::KnowledgeLevel;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("Please wait for the current study to finish loading.")]
    Busy,

    #[error("\"{0}\" does not look like a Bible study request.")]
    NotRelevant(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Tab {0} does not exist")]
    NoSuchTab(usize),

    #[error("Tab {tab} has no item {sub}")]
    NoSuchSubTab { tab: usize, sub: usize },

    #[error("Tab {0} is not a group")]
    NotAGroup(usize),

    #[error("Groups cannot contain other groups")]
    NestedGroup,

    #[error("Select at least two tabs to create a group")]
    SelectionTooSmall,

    #[error("{0}")]
    InvalidOperation(String),

    #[error("The active tab is not a {0} study")]
    WrongMode(&'static str),

    #[error("All {total} sessions of the {level} plan have already been loaded")]
    CurriculumComplete { level: KnowledgeLevel, total: u32 },

    #[error("Already at the {0} of the Bible")]
    EndOfCanon(&'static str),

    #[error("Generation failed: {0}")]
    Generation(String),
}

impl StudyError {
    /// Rejections leave state untouched; generation failures do not.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, StudyError::Generation(_))
    }
}

pub type Result<T> = std::result::Result<T, StudyError>;
