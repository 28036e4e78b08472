//! Selection that survives tree rebuilds.
//!
//! Before every rebuild the checked leaves are captured. An empty capture
//! never overwrites the remembered selection, so narrowing a filter until
//! nothing is visible and then clearing it restores what was checked.

use crate::locks::record::LockTable;
use crate::tree::{FileTree, TreeFilter, TreeMode};
use serde::Serialize;
use std::collections::BTreeSet;

/// Relative paths of checked, non-directory items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSet {
    paths: BTreeSet<String>,
}

impl SelectionSet {
    pub fn contains(&self, identifier: &str) -> bool {
        self.paths.contains(identifier)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A tree plus the selection remembered across its rebuilds.
#[derive(Debug, Clone, Default)]
pub struct TreeView {
    tree: FileTree,
    selection: SelectionSet,
}

impl TreeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut FileTree {
        &mut self.tree
    }

    /// The selection that will be re-applied on the next rebuild.
    pub fn remembered_selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Rebuild the lock view and re-apply the remembered selection.
    pub fn populate_locking(
        &mut self,
        tracked: &[String],
        table: &LockTable,
        filter: &TreeFilter<'_>,
    ) {
        self.repopulate(FileTree::for_locking(tracked, table, filter));
    }

    /// Rebuild the unlock view and re-apply the remembered selection.
    pub fn populate_unlocking(&mut self, table: &LockTable, filter: &TreeFilter<'_>) {
        self.repopulate(FileTree::for_unlocking(table, filter));
    }

    /// Swap in a freshly built tree, carrying the selection over.
    pub fn repopulate(&mut self, tree: FileTree) {
        self.capture();
        self.tree = tree;
        self.restore();
    }

    /// Relative paths of checked leaves, in tree order.
    pub fn selected_leaf_paths(&self) -> Vec<String> {
        self.tree
            .leaves()
            .map(|id| self.tree.item(id))
            .filter(|item| item.checked)
            .map(|item| item.node.relative_path().to_owned())
            .collect()
    }

    /// Check exactly the leaves named by `identifiers` (paths, or lock ids in
    /// the unlock view). An empty set leaves the tree untouched.
    ///
    /// Returns how many leaves ended up checked.
    pub fn set_selected_items<S: AsRef<str>>(&mut self, identifiers: &[S]) -> usize {
        if identifiers.is_empty() {
            return 0;
        }
        let leaves: Vec<_> = self.tree.leaves().collect();
        let mut selected = 0;
        for id in leaves {
            let needs_selection = identifiers
                .iter()
                .any(|identifier| self.tree.item(id).node.matches_identifier(identifier.as_ref()));
            self.tree.set_checked(id, needs_selection);
            selected += usize::from(needs_selection);
        }
        log::debug!("[selection] Applied {selected} of {} identifiers", identifiers.len());
        selected
    }

    /// Uncheck everything and forget the remembered selection.
    pub fn clear_all_selections(&mut self) {
        let leaves: Vec<_> = self.tree.leaves().collect();
        for id in leaves {
            self.tree.set_checked(id, false);
        }
        self.selection = SelectionSet::default();
    }

    /// Checked paths joined by spaces, ready for the clipboard.
    pub fn selection_text(&self) -> String {
        self.selected_leaf_paths().join(" ")
    }

    /// Lock ids of checked leaves joined by spaces (unlock view only).
    pub fn selected_lock_ids_text(&self) -> String {
        if self.tree.mode() != TreeMode::Unlock {
            return String::new();
        }
        self.tree
            .leaves()
            .map(|id| self.tree.item(id))
            .filter(|item| item.checked)
            .filter_map(|item| item.node.lock())
            .map(|lock| lock.lock_id.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn capture(&mut self) {
        let current: SelectionSet = self.selected_leaf_paths().into_iter().collect();
        if !current.is_empty() {
            self.selection = current;
        }
    }

    fn restore(&mut self) {
        let leaves: Vec<_> = self.tree.leaves().collect();
        for id in leaves {
            let node = &self.tree.item(id).node;
            let checked = self.selection.contains(node.relative_path())
                || node
                    .lock()
                    .is_some_and(|lock| self.selection.contains(&lock.lock_id));
            self.tree.set_checked(id, checked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::record::LockRecord;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn check(view: &mut TreeView, path: &str) {
        let id = view.tree().find(path).unwrap();
        view.tree_mut().set_checked(id, true);
    }

    #[test]
    fn test_selection_restored_after_repopulate() {
        let tracked = paths(&["a/b.txt", "a/c.txt"]);
        let table = LockTable::default();
        let mut view = TreeView::new();
        view.populate_locking(&tracked, &table, &TreeFilter::default());
        check(&mut view, "a/b.txt");

        view.populate_locking(&tracked, &table, &TreeFilter::default());
        assert_eq!(view.selected_leaf_paths(), vec!["a/b.txt".to_owned()]);
    }

    #[test]
    fn test_cached_selection_restores_leaf() {
        let mut view = TreeView {
            tree: FileTree::default(),
            selection: ["a/b.txt"].into_iter().collect(),
        };
        view.populate_locking(
            &paths(&["a/b.txt", "a/other.txt"]),
            &LockTable::default(),
            &TreeFilter::default(),
        );
        let leaf = view.tree().find("a/b.txt").unwrap();
        assert!(view.tree().item(leaf).checked);
        assert_eq!(view.selected_leaf_paths().len(), 1);
    }

    #[test]
    fn test_empty_capture_keeps_remembered_selection() {
        let tracked = paths(&["art/hero.psd", "art/villain.psd"]);
        let table = LockTable::default();
        let mut view = TreeView::new();
        view.populate_locking(&tracked, &table, &TreeFilter::default());
        check(&mut view, "art/hero.psd");

        // Filter hides the checked leaf, then matches nothing at all
        let villain = TreeFilter {
            text: "villain",
            ..TreeFilter::default()
        };
        view.populate_locking(&tracked, &table, &villain);
        assert!(view.selected_leaf_paths().is_empty());
        let nothing = TreeFilter {
            text: "zzz",
            ..TreeFilter::default()
        };
        view.populate_locking(&tracked, &table, &nothing);
        assert_eq!(view.remembered_selection().len(), 1);
        assert!(view.remembered_selection().contains("art/hero.psd"));

        // Clearing the filter restores the original selection
        view.populate_locking(&tracked, &table, &TreeFilter::default());
        assert_eq!(view.selected_leaf_paths(), vec!["art/hero.psd".to_owned()]);
    }

    #[test]
    fn test_set_selected_items_by_lock_id() {
        let table = LockTable::from_records([
            LockRecord::new("11", "alice", "a.bin", true, true),
            LockRecord::new("12", "bob", "b.bin", true, true),
        ]);
        let mut view = TreeView::new();
        view.populate_unlocking(&table, &TreeFilter::default());

        let selected = view.set_selected_items(&["12", "not-there"]);
        assert_eq!(selected, 1);
        assert_eq!(view.selected_leaf_paths(), vec!["b.bin".to_owned()]);
        assert_eq!(view.selected_lock_ids_text(), "12");

        // Applying a new set replaces the old one
        view.set_selected_items(&["a.bin"]);
        assert_eq!(view.selected_leaf_paths(), vec!["a.bin".to_owned()]);
    }

    #[test]
    fn test_set_selected_items_empty_is_noop() {
        let mut view = TreeView::new();
        view.populate_locking(&paths(&["x"]), &LockTable::default(), &TreeFilter::default());
        check(&mut view, "x");
        let none: [&str; 0] = [];
        assert_eq!(view.set_selected_items(&none), 0);
        assert_eq!(view.selected_leaf_paths(), vec!["x".to_owned()]);
    }

    #[test]
    fn test_clear_all_selections_forgets() {
        let tracked = paths(&["x", "y"]);
        let mut view = TreeView::new();
        view.populate_locking(&tracked, &LockTable::default(), &TreeFilter::default());
        check(&mut view, "x");
        view.populate_locking(&tracked, &LockTable::default(), &TreeFilter::default());

        view.clear_all_selections();
        assert!(view.selected_leaf_paths().is_empty());
        view.populate_locking(&tracked, &LockTable::default(), &TreeFilter::default());
        assert!(view.selected_leaf_paths().is_empty());
    }

    #[test]
    fn test_selection_text() {
        let mut view = TreeView::new();
        view.populate_locking(
            &paths(&["a/one", "b/two", "c"]),
            &LockTable::default(),
            &TreeFilter::default(),
        );
        check(&mut view, "a/one");
        check(&mut view, "c");
        assert_eq!(view.selection_text(), "a/one c");
        assert_eq!(view.selected_lock_ids_text(), "");
    }
}
