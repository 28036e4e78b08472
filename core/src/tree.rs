//! File trees for the lock and unlock views.
//!
//! Paths are decomposed at `/` boundaries into one directory node per unique
//! prefix and one leaf per file. Directory creation never depends on the
//! filters: a directory whose leaves were all filtered out still exists but
//! is marked hidden by a post-pass.

use crate::locks::record::{owner_matches, LockRecord, LockTable, ALL_OWNERS};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

pub type NodeId = usize;

/// Which view a tree is built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeMode {
    /// Tracked files that are not locked yet.
    #[default]
    Lock,
    /// Existing locks.
    Unlock,
}

impl From<crate::settings::Mode> for TreeMode {
    fn from(mode: crate::settings::Mode) -> Self {
        match mode {
            crate::settings::Mode::Lock => Self::Lock,
            crate::settings::Mode::Unlock => Self::Unlock,
        }
    }
}

/// A directory or a file leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TreeNode {
    #[serde(rename_all = "camelCase")]
    Directory { name: String, relative_path: String },
    #[serde(rename_all = "camelCase")]
    File {
        name: String,
        relative_path: String,
        /// Present for leaves in the unlock view.
        lock: Option<LockRecord>,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    pub fn relative_path(&self) -> &str {
        match self {
            Self::Directory { relative_path, .. } | Self::File { relative_path, .. } => {
                relative_path
            }
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    pub fn lock(&self) -> Option<&LockRecord> {
        match self {
            Self::File { lock, .. } => lock.as_ref(),
            Self::Directory { .. } => None,
        }
    }

    /// Whether a selection identifier names this leaf (by path or lock id).
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        match self {
            Self::Directory { .. } => false,
            Self::File {
                relative_path,
                lock,
                ..
            } => {
                relative_path == identifier
                    || lock.as_ref().is_some_and(|lock| lock.lock_id == identifier)
            }
        }
    }

    /// A locked leaf whose file is missing from the working tree.
    pub fn is_missing_locally(&self) -> bool {
        self.lock().is_some_and(|lock| !lock.is_local_file)
    }
}

/// Tri-state check of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Checked,
    Unchecked,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeItem {
    pub node: TreeNode,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Number of `/` separators in the path; root entries are depth 0.
    pub depth: usize,
    pub hidden: bool,
    pub expanded: bool,
    pub checked: bool,
}

/// Filters applied while building a tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeFilter<'a> {
    /// Case-insensitive substring; empty matches everything.
    pub text: &'a str,
    /// Owner filter for the unlock view; [`ALL_OWNERS`] matches everyone.
    pub owner: &'a str,
    /// Start-anchored path filter for the lock view.
    pub path_filter: Option<&'a Regex>,
    pub expansion_depth: usize,
}

impl Default for TreeFilter<'_> {
    fn default() -> Self {
        Self {
            text: "",
            owner: ALL_OWNERS,
            path_filter: None,
            expansion_depth: 0,
        }
    }
}

impl TreeFilter<'_> {
    fn matches_text(&self, path: &str) -> bool {
        self.text.is_empty() || path.to_lowercase().contains(&self.text.to_lowercase())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileTree {
    mode: TreeMode,
    items: Vec<TreeItem>,
    roots: Vec<NodeId>,
    #[serde(skip)]
    by_path: HashMap<String, NodeId>,
}

impl FileTree {
    /// Tracked files available to lock: locked files are left out.
    pub fn for_locking(tracked: &[String], table: &LockTable, filter: &TreeFilter<'_>) -> Self {
        let mut tree = Self {
            mode: TreeMode::Lock,
            ..Self::default()
        };
        for path in tracked {
            if filter.path_filter.is_some_and(|re| !re.is_match(path)) {
                continue;
            }
            let include = !table.is_locked(path) && filter.matches_text(path);
            tree.insert_path(path, include.then_some(None));
        }
        tree.finish(filter);
        tree
    }

    /// Existing locks matching the owner filter.
    pub fn for_unlocking(table: &LockTable, filter: &TreeFilter<'_>) -> Self {
        let mut tree = Self {
            mode: TreeMode::Unlock,
            ..Self::default()
        };
        for record in table.records() {
            let include = owner_matches(filter.owner, &record.owner)
                && filter.matches_text(&record.relative_path);
            tree.insert_path(&record.relative_path, include.then(|| Some(record.clone())));
        }
        tree.finish(filter);
        tree
    }

    pub fn mode(&self) -> TreeMode {
        self.mode
    }

    pub fn items(&self) -> &[TreeItem] {
        &self.items
    }

    pub fn item(&self, id: NodeId) -> &TreeItem {
        &self.items[id]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, relative_path: &str) -> Option<NodeId> {
        self.by_path.get(relative_path).copied()
    }

    /// Ids of every leaf, in insertion order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.node.is_directory())
            .map(|(id, _)| id)
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        if self.items[id].node.is_directory() {
            for leaf in self.descendant_leaves(id) {
                self.items[leaf].checked = checked;
            }
        } else {
            self.items[id].checked = checked;
        }
    }

    /// Checked, partially checked or unchecked, derived from leaf descendants.
    pub fn check_state(&self, id: NodeId) -> CheckState {
        if !self.items[id].node.is_directory() {
            return if self.items[id].checked {
                CheckState::Checked
            } else {
                CheckState::Unchecked
            };
        }
        let leaves = self.descendant_leaves(id);
        let checked = leaves.iter().filter(|&&leaf| self.items[leaf].checked).count();
        match checked {
            0 => CheckState::Unchecked,
            n if n == leaves.len() => CheckState::Checked,
            _ => CheckState::Partial,
        }
    }

    /// Expand or collapse a node and everything below it.
    pub fn set_expanded_recursively(&mut self, id: NodeId, expanded: bool) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.items[current].expanded = expanded;
            stack.extend(self.items[current].children.iter().copied());
        }
    }

    /// Reset expansion so nodes shallower than `depth` are expanded.
    pub fn enforce_expansion_depth(&mut self, depth: usize) {
        for item in &mut self.items {
            item.expanded = item.depth < depth;
        }
    }

    fn descendant_leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let item = &self.items[current];
            if item.node.is_directory() {
                stack.extend(item.children.iter().copied());
            } else {
                leaves.push(current);
            }
        }
        leaves
    }

    /// Materialize the ancestors of `path` and, when `leaf` is `Some`, the leaf itself.
    fn insert_path(&mut self, path: &str, leaf: Option<Option<LockRecord>>) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((file_name, dirs)) = segments.split_last() else {
            return;
        };

        let mut parent = None;
        let mut prefix = String::new();
        for (depth, dir) in dirs.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(dir);
            let existing = self.by_path.get(&prefix).copied();
            parent = Some(match existing {
                Some(id) => id,
                None => self.push(
                    TreeNode::Directory {
                        name: (*dir).to_owned(),
                        relative_path: prefix.clone(),
                    },
                    parent,
                    depth,
                ),
            });
        }

        let Some(lock) = leaf else {
            return;
        };
        let full_path = segments.join("/");
        if self.by_path.contains_key(&full_path) {
            return;
        }
        self.push(
            TreeNode::File {
                name: (*file_name).to_owned(),
                relative_path: full_path,
                lock,
            },
            parent,
            dirs.len(),
        );
    }

    fn push(&mut self, node: TreeNode, parent: Option<NodeId>, depth: usize) -> NodeId {
        let id = self.items.len();
        self.by_path.insert(node.relative_path().to_owned(), id);
        self.items.push(TreeItem {
            node,
            parent,
            children: Vec::new(),
            depth,
            hidden: false,
            expanded: false,
            checked: false,
        });
        match parent {
            Some(parent) => self.items[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    fn finish(&mut self, filter: &TreeFilter<'_>) {
        self.hide_empty_directories();
        if filter.text.is_empty() {
            self.enforce_expansion_depth(filter.expansion_depth);
        } else {
            for item in &mut self.items {
                item.expanded = true;
            }
        }
    }

    fn hide_empty_directories(&mut self) {
        // Children are always pushed after their parent, so a reverse walk is post-order
        let mut has_leaf = vec![false; self.items.len()];
        for id in (0..self.items.len()).rev() {
            let item = &self.items[id];
            has_leaf[id] = !item.node.is_directory()
                || item.children.iter().any(|&child| has_leaf[child]);
        }
        for (item, has_leaf) in self.items.iter_mut().zip(has_leaf) {
            item.hidden = item.node.is_directory() && !has_leaf;
        }
    }
}
