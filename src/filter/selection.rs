use std::collections::BTreeSet;

use super::tree::{FilterTree, TreeNode};

/// Names of the checked nodes in a [`FilterTree`].
///
/// Branch membership is derived: after [`Selection::normalized`] a branch is
/// present exactly when all of its direct children are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    names: BTreeSet<String>,
}

impl Selection {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Applies one click on `name` before normalization: checking cascades to
    /// every descendant in the tree, unchecking drops the node together with
    /// any checked descendants.
    pub fn toggled(&self, tree: &FilterTree, name: &str) -> Self {
        let mut names = self.names.clone();

        if names.contains(name) {
            names.retain(|selected| selected != name && !tree.is_descendant_name(name, selected));
        } else {
            names.insert(name.to_string());
            names.extend(tree.descendants(name));
        }

        Self { names }
    }

    /// Recomputes every branch bottom-up, so one pass settles arbitrarily
    /// deep hierarchies.
    pub fn normalized(&self, tree: &FilterTree) -> Self {
        let mut names = self.names.clone();
        for root in tree.roots() {
            settle(root, &mut names);
        }
        Self { names }
    }
}

fn settle(node: &TreeNode, names: &mut BTreeSet<String>) {
    if node.is_leaf() {
        return;
    }

    for child in &node.children {
        settle(child, names);
    }

    if node.children.iter().all(|child| names.contains(&child.name)) {
        names.insert(node.name.clone());
    } else {
        names.remove(&node.name);
    }
}

impl<S: Into<String>> FromIterator<S> for Selection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
