//! Ordered tab strip with groups and an always-valid active pointer.
//!
//! Every mutation leaves `(active_tab, active_sub)` resolving to an existing
//! study, or `(0, 0)` when no tabs are open. Operations that move things
//! around remember the active study first and find it again afterwards by
//! structural equality, rather than guessing where it ended up.
//!
//! Group operations and multi-select grouping live in [`groups`].

mod groups;

use shared::error::{Result, StudyError};
use shared::study::StudyItem;
use shared::tabs::Tab;
use std::collections::BTreeSet;

/// Where `open` put the requested study
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opened {
    /// Already open; the active pointer moved to it
    Focused { tab: usize, sub: usize },
    /// Appended as a new plain tab
    Appended { tab: usize },
}

#[derive(Debug, Clone, Default)]
pub struct TabManager {
    tabs: Vec<Tab>,
    active_tab: usize,
    active_sub: usize,
    selecting: bool,
    selected: BTreeSet<usize>,
}

impl TabManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn tab(&self, index: usize) -> Option<&Tab> {
        self.tabs.get(index)
    }

    /// `(tab, sub)` of the active study, `None` when nothing is open.
    pub fn active(&self) -> Option<(usize, usize)> {
        self.active_item()
            .map(|_| (self.active_tab, self.active_sub))
    }

    pub fn active_item(&self) -> Option<&StudyItem> {
        self.tabs
            .get(self.active_tab)
            .and_then(|tab| tab.item(self.active_sub))
    }

    /// Locate an open study in plain tabs and group members.
    pub fn find(&self, item: &StudyItem) -> Option<(usize, usize)> {
        self.tabs
            .iter()
            .enumerate()
            .find_map(|(index, tab)| tab.locate(item).map(|sub| (index, sub)))
    }

    pub fn contains(&self, item: &StudyItem) -> bool {
        self.find(item).is_some()
    }

    /// Focus `item` if it is already open, otherwise append it and focus it.
    pub fn open(&mut self, item: StudyItem) -> Opened {
        if let Some((tab, sub)) = self.find(&item) {
            self.active_tab = tab;
            self.active_sub = sub;
            return Opened::Focused { tab, sub };
        }

        self.tabs.push(Tab::Single(item));
        self.selected.clear();
        self.active_tab = self.tabs.len() - 1;
        self.active_sub = 0;
        Opened::Appended {
            tab: self.active_tab,
        }
    }

    pub fn select(&mut self, tab: usize, sub: usize) -> Result<()> {
        let target = self.tabs.get(tab).ok_or(StudyError::NoSuchTab(tab))?;
        if target.item(sub).is_none() {
            return Err(StudyError::NoSuchSubTab { tab, sub });
        }
        self.active_tab = tab;
        self.active_sub = sub;
        Ok(())
    }

    /// Close a whole tab, or one member of a group when `sub` is given.
    ///
    /// Returns the studies that were removed.
    pub fn close(&mut self, tab: usize, sub: Option<usize>) -> Result<Vec<StudyItem>> {
        let target = self.tabs.get(tab).ok_or(StudyError::NoSuchTab(tab))?;
        let group_len = match target {
            Tab::Group(group) => Some(group.items.len()),
            Tab::Single(_) => None,
        };
        match (group_len, sub) {
            (Some(len), Some(sub)) => {
                if sub >= len {
                    return Err(StudyError::NoSuchSubTab { tab, sub });
                }
                let removed = self.take_member(tab, sub).ok_or(StudyError::NotAGroup(tab))?;
                if self.active_tab == tab && self.active_sub > sub {
                    self.active_sub -= 1;
                }
                self.selected.clear();
                self.normalize_active();
                Ok(vec![removed])
            }
            (None, Some(sub)) if sub != 0 => Err(StudyError::NoSuchSubTab { tab, sub }),
            _ => Ok(self.remove_tab(tab)),
        }
    }

    /// Close every tab except `keep`. With `sub`, a kept group is also
    /// reduced to that one member.
    pub fn close_others(&mut self, keep: usize, sub: Option<usize>) -> Result<Vec<StudyItem>> {
        let kept = self.tabs.get(keep).ok_or(StudyError::NoSuchTab(keep))?;
        let kept_item = match sub {
            Some(sub) => Some(
                kept.item(sub)
                    .cloned()
                    .ok_or(StudyError::NoSuchSubTab { tab: keep, sub })?,
            ),
            None => None,
        };

        let previous = self.active_item().cloned();
        let mut removed = Vec::new();
        let tabs = std::mem::take(&mut self.tabs);
        for (index, tab) in tabs.into_iter().enumerate() {
            if index != keep {
                removed.extend(tab.items());
                continue;
            }
            match (&kept_item, tab) {
                (Some(item), Tab::Group(group)) => {
                    removed.extend(group.items.into_iter().filter(|member| member != item));
                    self.tabs.push(Tab::Single(item.clone()));
                }
                (_, tab) => self.tabs.push(tab),
            }
        }

        self.active_tab = 0;
        self.active_sub = 0;
        self.selected.clear();
        self.relocate(previous.as_ref());
        Ok(removed)
    }

    /// Close every tab after `from`.
    pub fn close_to_right(&mut self, from: usize) -> Result<Vec<StudyItem>> {
        if from >= self.tabs.len() {
            return Err(StudyError::NoSuchTab(from));
        }
        let removed = self
            .tabs
            .split_off(from + 1)
            .into_iter()
            .flat_map(|tab| tab.items())
            .collect();
        if self.active_tab > from {
            self.active_tab = from;
            self.active_sub = 0;
        }
        self.selected.clear();
        self.normalize_active();
        Ok(removed)
    }

    pub fn close_all(&mut self) -> Vec<StudyItem> {
        let removed = self.tabs.drain(..).flat_map(|tab| tab.items()).collect();
        self.selected.clear();
        self.selecting = false;
        self.normalize_active();
        removed
    }

    /// Move a tab; the active study is found again afterwards.
    pub fn reorder(&mut self, drag: usize, drop: usize) -> Result<()> {
        if drag >= self.tabs.len() {
            return Err(StudyError::NoSuchTab(drag));
        }
        if drop >= self.tabs.len() {
            return Err(StudyError::NoSuchTab(drop));
        }
        if drag == drop {
            return Ok(());
        }

        let previous = self.active_item().cloned();
        let moved = self.tabs.remove(drag);
        self.tabs.insert(drop, moved);
        self.selected.clear();
        self.relocate(previous.as_ref());
        Ok(())
    }

    /// Remove a whole tab and step the active pointer back if it was at or
    /// after the removed position.
    fn remove_tab(&mut self, index: usize) -> Vec<StudyItem> {
        let removed = self.tabs.remove(index);
        if index < self.active_tab {
            self.active_tab -= 1;
        } else if index == self.active_tab {
            self.active_tab = self.active_tab.saturating_sub(1);
            self.active_sub = 0;
        }
        self.selected.clear();
        self.normalize_active();
        removed.items()
    }

    /// Take one member out of the group at `tab`, dissolving the group in
    /// place when a single member is left. `None` if `tab` is not a group or
    /// `sub` is out of range.
    fn take_member(&mut self, tab: usize, sub: usize) -> Option<StudyItem> {
        let Some(Tab::Group(group)) = self.tabs.get_mut(tab) else {
            return None;
        };
        if sub >= group.items.len() {
            return None;
        }
        let removed = group.items.remove(sub);
        if group.items.len() == 1 {
            tracing::debug!(group = %group.name, "group reduced to one study, dissolving");
            let last = group.items.remove(0);
            self.tabs[tab] = Tab::Single(last);
        }
        Some(removed)
    }

    /// Point at `item` if it is still open, otherwise clamp.
    fn relocate(&mut self, item: Option<&StudyItem>) {
        if let Some((tab, sub)) = item.and_then(|item| self.find(item)) {
            self.active_tab = tab;
            self.active_sub = sub;
        }
        self.normalize_active();
    }

    fn normalize_active(&mut self) {
        if self.tabs.is_empty() {
            self.active_tab = 0;
            self.active_sub = 0;
            return;
        }
        self.active_tab = self.active_tab.min(self.tabs.len() - 1);
        let members = self.tabs[self.active_tab].len();
        self.active_sub = self.active_sub.min(members.saturating_sub(1));
    }

    /// Structural invariants: no empty or one-member groups, and the active
    /// pointer resolves whenever a tab is open.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let groups_ok = self.tabs.iter().all(|tab| match tab {
            Tab::Single(_) => true,
            Tab::Group(group) => group.items.len() >= 2,
        });
        let active_ok = if self.tabs.is_empty() {
            self.active_tab == 0 && self.active_sub == 0
        } else {
            self.active_item().is_some()
        };
        let selection_ok = self.selected.iter().all(|index| *index < self.tabs.len());
        groups_ok && active_ok && selection_ok
    }
}
