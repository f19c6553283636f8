//! Tab groups: creation, membership changes, renaming, multi-select.

use shared::error::{Result, StudyError};
use shared::study::StudyItem;
use shared::tabs::{Tab, TabGroup};

use super::TabManager;

impl TabManager {
    fn single_at(&self, index: usize) -> Result<&StudyItem> {
        match self.tabs.get(index) {
            Some(Tab::Single(item)) => Ok(item),
            Some(Tab::Group(_)) => Err(StudyError::NestedGroup),
            None => Err(StudyError::NoSuchTab(index)),
        }
    }

    fn group_at(&self, index: usize) -> Result<&TabGroup> {
        match self.tabs.get(index) {
            Some(Tab::Group(group)) => Ok(group),
            Some(Tab::Single(_)) => Err(StudyError::NotAGroup(index)),
            None => Err(StudyError::NoSuchTab(index)),
        }
    }

    fn group_at_mut(&mut self, index: usize) -> Result<&mut TabGroup> {
        match self.tabs.get_mut(index) {
            Some(Tab::Group(group)) => Ok(group),
            Some(Tab::Single(_)) => Err(StudyError::NotAGroup(index)),
            None => Err(StudyError::NoSuchTab(index)),
        }
    }

    /// Drop one plain tab onto another to make a new group of the two,
    /// ordered `[dragged, dropped]`. The group takes the dropped tab's place
    /// and becomes active.
    pub fn create_group_from_two(&mut self, drag: usize, drop: usize) -> Result<()> {
        if drag == drop {
            return Err(StudyError::InvalidOperation(
                "Cannot group a tab with itself".into(),
            ));
        }
        let dragged = self.single_at(drag)?.clone();
        let dropped = self.single_at(drop)?.clone();

        self.tabs.remove(drag);
        let position = if drag < drop { drop - 1 } else { drop };
        self.tabs[position] = Tab::Group(TabGroup::new(vec![dragged, dropped]));

        self.selected.clear();
        self.active_tab = position;
        self.active_sub = 0;
        tracing::debug!(position, "created tab group");
        Ok(())
    }

    /// Move a plain tab into an existing group, appending it.
    pub fn add_to_group(&mut self, drag: usize, group: usize) -> Result<()> {
        if drag == group {
            return Err(StudyError::NestedGroup);
        }
        let item = self.single_at(drag)?.clone();
        self.group_at(group)?;

        let previous = self.active_item().cloned();
        self.group_at_mut(group)?.items.push(item);
        self.tabs.remove(drag);
        self.selected.clear();
        self.relocate(previous.as_ref());
        Ok(())
    }

    /// Replace a group with its members, in order, at the same position.
    pub fn ungroup(&mut self, group: usize) -> Result<()> {
        self.group_at(group)?;
        let previous = self.active_item().cloned();

        let Tab::Group(removed) = self.tabs.remove(group) else {
            return Err(StudyError::NotAGroup(group));
        };
        for (offset, member) in removed.items.into_iter().enumerate() {
            self.tabs.insert(group + offset, Tab::Single(member));
        }

        self.selected.clear();
        self.relocate(previous.as_ref());
        Ok(())
    }

    /// Pull one member out into a plain tab right after the group.
    pub fn remove_from_group(&mut self, group: usize, sub: usize) -> Result<()> {
        let len = self.group_at(group)?.items.len();
        if sub >= len {
            return Err(StudyError::NoSuchSubTab { tab: group, sub });
        }

        let previous = self.active_item().cloned();
        let item = self
            .take_member(group, sub)
            .ok_or(StudyError::NotAGroup(group))?;
        self.tabs.insert(group + 1, Tab::Single(item));

        self.selected.clear();
        self.relocate(previous.as_ref());
        Ok(())
    }

    /// Pull one member out and insert it as a plain tab at `target`
    /// (clamped to the end of the strip).
    ///
    /// The source group keeps its position, dissolved or not, so `target`
    /// is read against the strip as it looks before the move.
    pub fn move_out_of_group(&mut self, group: usize, sub: usize, target: usize) -> Result<()> {
        let len = self.group_at(group)?.items.len();
        if sub >= len {
            return Err(StudyError::NoSuchSubTab { tab: group, sub });
        }

        let previous = self.active_item().cloned();
        let item = self
            .take_member(group, sub)
            .ok_or(StudyError::NotAGroup(group))?;
        let target = target.min(self.tabs.len());
        self.tabs.insert(target, Tab::Single(item));

        self.selected.clear();
        self.relocate(previous.as_ref());
        Ok(())
    }

    pub fn reorder_in_group(&mut self, group: usize, drag: usize, drop: usize) -> Result<()> {
        let len = self.group_at(group)?.items.len();
        for sub in [drag, drop] {
            if sub >= len {
                return Err(StudyError::NoSuchSubTab { tab: group, sub });
            }
        }

        let previous = self.active_item().cloned();
        let members = &mut self.group_at_mut(group)?.items;
        let moved = members.remove(drag);
        members.insert(drop, moved);
        self.relocate(previous.as_ref());
        Ok(())
    }

    pub fn rename(&mut self, group: usize, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudyError::InvalidOperation(
                "Group name cannot be empty".into(),
            ));
        }
        self.group_at_mut(group)?.name = name.to_string();
        Ok(())
    }

    // ── Multi-select grouping ─────────────────────────────────────────

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    pub fn enter_selection_mode(&mut self) {
        self.selecting = true;
        self.selected.clear();
    }

    pub fn exit_selection_mode(&mut self) {
        self.selecting = false;
        self.selected.clear();
    }

    /// Selected top-level indices, ascending
    pub fn selected(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    /// Flip the mark on a top-level tab. Returns whether it is now selected.
    pub fn toggle_selection(&mut self, index: usize) -> Result<bool> {
        if index >= self.tabs.len() {
            return Err(StudyError::NoSuchTab(index));
        }
        self.selecting = true;
        if self.selected.remove(&index) {
            Ok(false)
        } else {
            self.selected.insert(index);
            Ok(true)
        }
    }

    fn selected_items(&self) -> Result<Vec<StudyItem>> {
        self.selected
            .iter()
            .map(|index| self.single_at(*index).cloned())
            .collect()
    }

    /// Build one group from every selected tab, in strip order, at the
    /// lowest selected position. The new group becomes active.
    pub fn create_group_from_selection(&mut self) -> Result<()> {
        if self.selected.len() < 2 {
            return Err(StudyError::SelectionTooSmall);
        }
        let items = self.selected_items()?;
        let indices = self.selected();
        let Some(&first) = indices.first() else {
            return Err(StudyError::SelectionTooSmall);
        };

        for index in indices.iter().skip(1).rev() {
            self.tabs.remove(*index);
        }
        self.tabs[first] = Tab::Group(TabGroup::new(items));

        self.exit_selection_mode();
        self.active_tab = first;
        self.active_sub = 0;
        Ok(())
    }

    /// Append every selected tab to the group at `target`.
    pub fn add_selection_to_group(&mut self, target: usize) -> Result<()> {
        self.group_at(target)?;
        if self.selected.is_empty() {
            return Err(StudyError::InvalidOperation("No tabs selected".into()));
        }
        if self.selected.contains(&target) {
            return Err(StudyError::NestedGroup);
        }
        let items = self.selected_items()?;
        let indices = self.selected();

        let previous = self.active_item().cloned();
        self.group_at_mut(target)?.items.extend(items);
        for index in indices.iter().rev() {
            self.tabs.remove(*index);
        }

        self.exit_selection_mode();
        self.relocate(previous.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{manager, topic};
    use super::*;

    fn names(tabs: &TabManager) -> Vec<String> {
        tabs.tabs().iter().map(|tab| tab.label()).collect()
    }

    fn group_members(tabs: &TabManager, index: usize) -> Vec<StudyItem> {
        match tabs.tab(index) {
            Some(Tab::Group(group)) => group.items.clone(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_create_group_from_two_forward() {
        let mut tabs = manager(&["a", "b", "c"]);
        tabs.create_group_from_two(0, 2).unwrap();
        // [b, Group(a, c)]
        assert_eq!(tabs.len(), 2);
        assert_eq!(group_members(&tabs, 1), vec![topic("a"), topic("c")]);
        assert_eq!(tabs.active(), Some((1, 0)));
    }

    #[test]
    fn test_create_group_from_two_backward() {
        let mut tabs = manager(&["a", "b", "c"]);
        tabs.create_group_from_two(2, 0).unwrap();
        // [Group(c, a), b]
        assert_eq!(group_members(&tabs, 0), vec![topic("c"), topic("a")]);
        assert_eq!(tabs.active_item(), Some(&topic("c")));
        assert_eq!(
            match tabs.tab(0) {
                Some(Tab::Group(group)) => group.name.as_str(),
                _ => "",
            },
            shared::tabs::DEFAULT_GROUP_NAME
        );
    }

    #[test]
    fn test_group_of_group_rejected() {
        let mut tabs = manager(&["a", "b", "c"]);
        tabs.create_group_from_two(0, 1).unwrap();
        let before = names(&tabs);

        assert!(matches!(
            tabs.create_group_from_two(0, 1),
            Err(StudyError::NestedGroup)
        ));
        assert!(matches!(
            tabs.create_group_from_two(1, 0),
            Err(StudyError::NestedGroup)
        ));
        assert!(tabs.create_group_from_two(1, 1).is_err());
        assert_eq!(names(&tabs), before);
    }

    #[test]
    fn test_add_to_group() {
        let mut tabs = manager(&["a", "b", "c", "d"]);
        tabs.create_group_from_two(2, 3).unwrap();
        // [a, b, Group(c, d)]
        tabs.select(0, 0).unwrap();
        tabs.add_to_group(0, 2).unwrap();
        // [b, Group(c, d, a)]
        assert_eq!(tabs.len(), 2);
        assert_eq!(group_members(&tabs, 1), vec![topic("c"), topic("d"), topic("a")]);
        assert_eq!(tabs.active(), Some((1, 2)));

        assert!(matches!(tabs.add_to_group(1, 0), Err(StudyError::NestedGroup)));
        assert!(matches!(tabs.add_to_group(0, 0), Err(StudyError::NestedGroup)));
    }

    #[test]
    fn test_add_to_plain_tab_rejected() {
        let mut tabs = manager(&["a", "b"]);
        assert!(matches!(tabs.add_to_group(0, 1), Err(StudyError::NotAGroup(1))));
        assert_eq!(tabs.len(), 2);
    }

    #[test]
    fn test_ungroup_splices_in_place() {
        let mut tabs = manager(&["a", "b", "c", "d"]);
        tabs.create_group_from_two(1, 2).unwrap();
        // [a, Group(b, c), d]
        tabs.select(1, 1).unwrap();
        tabs.ungroup(1).unwrap();

        let labels = names(&tabs);
        assert_eq!(labels, vec!["a", "b", "c", "d"]);
        assert_eq!(tabs.active_item(), Some(&topic("c")));
        assert!(matches!(tabs.ungroup(0), Err(StudyError::NotAGroup(0))));
    }

    #[test]
    fn test_remove_from_group_dissolves() {
        let mut tabs = manager(&["a", "b", "c"]);
        tabs.create_group_from_two(0, 1).unwrap();
        // [Group(a, b), c]
        tabs.remove_from_group(0, 0).unwrap();
        // [b, a, c]
        assert_eq!(names(&tabs), vec!["b", "a", "c"]);
        assert!(tabs.tabs().iter().all(|tab| !tab.is_group()));
        assert_eq!(tabs.active_item(), Some(&topic("a")));
    }

    #[test]
    fn test_remove_from_larger_group() {
        let mut tabs = manager(&["a", "b", "c", "d"]);
        tabs.toggle_selection(0).unwrap();
        tabs.toggle_selection(1).unwrap();
        tabs.toggle_selection(2).unwrap();
        tabs.create_group_from_selection().unwrap();
        // [Group(a, b, c), d]
        tabs.remove_from_group(0, 1).unwrap();
        // [Group(a, c), b, d]
        assert_eq!(group_members(&tabs, 0), vec![topic("a"), topic("c")]);
        assert!(matches!(tabs.tab(1), Some(Tab::Single(item)) if item == &topic("b")));
    }

    #[test]
    fn test_move_out_of_group() {
        let mut tabs = manager(&["a", "b", "c", "d"]);
        tabs.create_group_from_two(0, 1).unwrap();
        // [Group(a, b), c, d]
        tabs.move_out_of_group(0, 1, 99).unwrap();
        // [a, c, d, b]
        assert_eq!(names(&tabs), vec!["a", "c", "d", "b"]);

        let mut tabs = manager(&["a", "b", "c", "d"]);
        tabs.toggle_selection(1).unwrap();
        tabs.toggle_selection(2).unwrap();
        tabs.toggle_selection(3).unwrap();
        tabs.create_group_from_selection().unwrap();
        // [a, Group(b, c, d)]
        tabs.move_out_of_group(1, 0, 0).unwrap();
        // [b, a, Group(c, d)]
        assert!(matches!(tabs.tab(0), Some(Tab::Single(item)) if item == &topic("b")));
        assert_eq!(group_members(&tabs, 2), vec![topic("c"), topic("d")]);
        assert!(tabs.is_consistent());
    }

    #[test]
    fn test_reorder_in_group() {
        let mut tabs = manager(&["a", "b", "c"]);
        tabs.enter_selection_mode();
        for index in 0..3 {
            tabs.toggle_selection(index).unwrap();
        }
        tabs.create_group_from_selection().unwrap();
        tabs.select(0, 0).unwrap();

        tabs.reorder_in_group(0, 0, 2).unwrap();
        assert_eq!(group_members(&tabs, 0), vec![topic("b"), topic("c"), topic("a")]);
        assert_eq!(tabs.active(), Some((0, 2)));
        assert!(tabs.reorder_in_group(0, 0, 3).is_err());
    }

    #[test]
    fn test_rename() {
        let mut tabs = manager(&["a", "b"]);
        tabs.create_group_from_two(0, 1).unwrap();
        tabs.rename(0, "  Patriarchs ").unwrap();
        assert!(tabs.tab(0).unwrap().label().starts_with("Patriarchs"));

        assert!(tabs.rename(0, "   ").is_err());
        assert!(tabs.tab(0).unwrap().label().starts_with("Patriarchs"));
    }

    #[test]
    fn test_selection_grouping_keeps_order() {
        let mut tabs = manager(&["a", "b", "c", "d", "e"]);
        tabs.enter_selection_mode();
        tabs.toggle_selection(3).unwrap();
        tabs.toggle_selection(1).unwrap();
        tabs.toggle_selection(4).unwrap();
        assert!(!tabs.toggle_selection(4).unwrap());
        assert_eq!(tabs.selected(), vec![1, 3]);

        tabs.create_group_from_selection().unwrap();
        // [a, Group(b, d), c, e]
        assert_eq!(group_members(&tabs, 1), vec![topic("b"), topic("d")]);
        assert_eq!(tabs.len(), 4);
        assert_eq!(tabs.active(), Some((1, 0)));
        assert!(!tabs.is_selecting());
    }

    #[test]
    fn test_selection_rejections() {
        let mut tabs = manager(&["a", "b", "c"]);
        tabs.toggle_selection(0).unwrap();
        assert!(matches!(
            tabs.create_group_from_selection(),
            Err(StudyError::SelectionTooSmall)
        ));

        tabs.exit_selection_mode();
        tabs.create_group_from_two(0, 1).unwrap();
        // [Group(a, b), c]
        tabs.toggle_selection(0).unwrap();
        tabs.toggle_selection(1).unwrap();
        assert!(matches!(
            tabs.create_group_from_selection(),
            Err(StudyError::NestedGroup)
        ));
        assert_eq!(tabs.len(), 2);
    }

    #[test]
    fn test_add_selection_to_group() {
        let mut tabs = manager(&["a", "b", "c", "d", "e"]);
        tabs.create_group_from_two(2, 3).unwrap();
        // [a, b, Group(c, d), e]
        tabs.select(3, 0).unwrap();
        tabs.toggle_selection(0).unwrap();
        tabs.toggle_selection(3).unwrap();

        tabs.add_selection_to_group(2).unwrap();
        // [b, Group(c, d, a, e)]
        assert_eq!(tabs.len(), 2);
        assert_eq!(
            group_members(&tabs, 1),
            vec![topic("c"), topic("d"), topic("a"), topic("e")]
        );
        assert_eq!(tabs.active_item(), Some(&topic("e")));
        assert!(tabs.is_consistent());
    }

    #[test]
    fn test_add_selection_rejects_groups() {
        let mut tabs = manager(&["a", "b", "c", "d"]);
        tabs.create_group_from_two(0, 1).unwrap();
        tabs.create_group_from_two(1, 2).unwrap();
        // [Group(a, b), Group(c, d)]
        tabs.toggle_selection(0).unwrap();
        assert!(matches!(
            tabs.add_selection_to_group(1),
            Err(StudyError::NestedGroup)
        ));
        assert_eq!(group_members(&tabs, 1), vec![topic("c"), topic("d")]);
    }

    /// Deterministic pseudo-random walk over every structural operation.
    #[test]
    fn test_active_pointer_survives_any_sequence() {
        let mut tabs = TabManager::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = |bound: usize| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % bound.max(1) as u64) as usize
        };

        let mut opened = 0;
        for _ in 0..2_000 {
            let len = tabs.len().max(1);
            let _ = match next(12) {
                0 | 1 => {
                    opened += 1;
                    tabs.open(topic(&format!("t{}", opened % 17)));
                    Ok(())
                }
                2 => tabs.close(next(len), None).map(|_| ()),
                3 => tabs.close(next(len), Some(next(4))).map(|_| ()),
                4 => tabs.reorder(next(len), next(len)),
                5 => tabs.create_group_from_two(next(len), next(len)),
                6 => tabs.add_to_group(next(len), next(len)),
                7 => tabs.ungroup(next(len)),
                8 => tabs.remove_from_group(next(len), next(4)),
                9 => tabs.move_out_of_group(next(len), next(4), next(len + 1)),
                10 => tabs.toggle_selection(next(len)).map(|_| ()),
                _ => match next(8) {
                    0 => tabs.create_group_from_selection(),
                    1 => tabs.add_selection_to_group(next(len)),
                    2 => tabs.close_to_right(next(len)).map(|_| ()),
                    3 => tabs.close_others(next(len), None).map(|_| ()),
                    4 => tabs.close_others(next(len), Some(next(4))).map(|_| ()),
                    5 => {
                        tabs.close_all();
                        Ok(())
                    }
                    _ => tabs.reorder_in_group(next(len), next(4), next(4)),
                },
            };
            assert!(tabs.is_consistent(), "inconsistent after {:?}", names(&tabs));
        }
    }
}
