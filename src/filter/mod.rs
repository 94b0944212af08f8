//! Event-type filter editing: the inferred name hierarchy, the checked set,
//! and the editor state that ties them together for one endpoint form.

mod selection;
mod tree;

use selection::Selection;
pub use tree::FilterTree;
use tree::TreeNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRow {
    pub name: String,
    pub depth: usize,
    pub checked: bool,
    /// Unchecked branch with at least one checked descendant.
    pub partial: bool,
    pub has_children: bool,
}

/// Filter-type editor for a single endpoint. Every mutation goes through
/// toggle followed by normalization, so `selection` is always consistent.
#[derive(Debug, Clone)]
pub struct FilterEditor {
    available: Vec<String>,
    tree: FilterTree,
    selection: Selection,
}

impl FilterEditor {
    pub fn new(available: Vec<String>, initial: Option<&[String]>) -> Self {
        let tree = FilterTree::build(&available);
        let selection = initial
            .unwrap_or_default()
            .iter()
            .cloned()
            .collect::<Selection>()
            .normalized(&tree);

        Self {
            available,
            tree,
            selection,
        }
    }

    pub fn tree(&self) -> &FilterTree {
        &self.tree
    }

    pub fn is_checked(&self, name: &str) -> bool {
        self.selection.contains(name)
    }

    /// Returns whether the checked set actually changed.
    pub fn toggle(&mut self, name: &str) -> bool {
        let next = self
            .selection
            .toggled(&self.tree, name)
            .normalized(&self.tree);
        if next == self.selection {
            return false;
        }
        self.selection = next;
        true
    }

    /// One pass over the tree; `partial` is settled on the way back up.
    pub fn rows(&self) -> Vec<FilterRow> {
        let mut rows = Vec::new();
        for root in self.tree.roots() {
            self.push_rows(root, 0, &mut rows);
        }
        rows
    }

    /// Returns whether `node` or anything below it is checked.
    fn push_rows(&self, node: &TreeNode, depth: usize, rows: &mut Vec<FilterRow>) -> bool {
        let checked = self.is_checked(&node.name);
        let index = rows.len();
        rows.push(FilterRow {
            name: node.name.clone(),
            depth,
            checked,
            partial: false,
            has_children: !node.is_leaf(),
        });

        let mut below = false;
        for child in &node.children {
            below |= self.push_rows(child, depth + 1, rows);
        }
        rows[index].partial = !checked && below;
        checked || below
    }

    /// The `filterTypes` value to submit: only names that are real event
    /// types, in the order the service listed them. Nothing checked means no
    /// filter at all.
    pub fn filter_types(&self) -> Option<Vec<String>> {
        let chosen: Vec<String> = self
            .available
            .iter()
            .filter(|name| self.is_checked(name))
            .cloned()
            .collect();

        if chosen.is_empty() { None } else { Some(chosen) }
    }
}
