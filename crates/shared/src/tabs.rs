//! Tab and tab-group types held in the workspace's top-level tab strip.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::study::StudyItem;

/// Name given to every freshly created group
pub const DEFAULT_GROUP_NAME: &str = "New Group";

/// Opaque group identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, ordered collection of studies shown under one tab.
///
/// Members are plain [`StudyItem`]s, so a group can never hold another group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabGroup {
    pub id: GroupId,
    pub name: String,
    pub items: Vec<StudyItem>,
}

impl TabGroup {
    pub fn new(items: Vec<StudyItem>) -> Self {
        Self {
            id: GroupId::new(),
            name: DEFAULT_GROUP_NAME.to_string(),
            items,
        }
    }

    pub fn position_of(&self, item: &StudyItem) -> Option<usize> {
        self.items.iter().position(|member| member == item)
    }
}

/// One slot in the top-level tab list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Tab {
    Single(StudyItem),
    Group(TabGroup),
}

impl Tab {
    pub fn is_group(&self) -> bool {
        matches!(self, Tab::Group(_))
    }

    /// Number of studies under this tab
    pub fn len(&self) -> usize {
        match self {
            Tab::Single(_) => 1,
            Tab::Group(group) => group.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Study at `sub`; a plain tab only answers to sub-index 0.
    pub fn item(&self, sub: usize) -> Option<&StudyItem> {
        match self {
            Tab::Single(item) => (sub == 0).then_some(item),
            Tab::Group(group) => group.items.get(sub),
        }
    }

    pub fn items(&self) -> Vec<StudyItem> {
        match self {
            Tab::Single(item) => vec![item.clone()],
            Tab::Group(group) => group.items.clone(),
        }
    }

    /// Sub-index of `item` under this tab, by structural equality.
    pub fn locate(&self, item: &StudyItem) -> Option<usize> {
        match self {
            Tab::Single(own) => (own == item).then_some(0),
            Tab::Group(group) => group.position_of(item),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Tab::Single(item) => item.title(),
            Tab::Group(group) => format!("{} ({})", group.name, group.items.len()),
        }
    }
}
