use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_SEPARATOR: char = '.';

static NON_ALPHANUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

/// One level of a separated-name hierarchy. `name` is the full path from the
/// root, so `transaction.deposit.usd` lives under `transaction.deposit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A forest built from flat event-type names plus the separator it was split on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTree {
    separator: char,
    roots: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRow<'a> {
    pub node: &'a TreeNode,
    pub depth: usize,
}

impl FilterTree {
    pub fn build<S: AsRef<str>>(names: &[S]) -> Self {
        let separator = infer_separator(names);
        Self::build_with_separator(names, separator)
    }

    pub fn build_with_separator<S: AsRef<str>>(names: &[S], separator: char) -> Self {
        // Arena of (name, children) so parents can be extended after creation.
        let mut slots: Vec<(String, Vec<usize>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut roots: Vec<usize> = Vec::new();

        for name in names {
            let mut path = String::new();
            let mut parent: Option<usize> = None;

            for (position, segment) in name.as_ref().split(separator).enumerate() {
                if position > 0 {
                    path.push(separator);
                }
                path.push_str(segment);

                let slot = match index.get(&path) {
                    Some(&existing) => existing,
                    None => {
                        let created = slots.len();
                        slots.push((path.clone(), Vec::new()));
                        index.insert(path.clone(), created);
                        match parent {
                            Some(parent_slot) => slots[parent_slot].1.push(created),
                            None => roots.push(created),
                        }
                        created
                    }
                };

                parent = Some(slot);
            }
        }

        let roots = roots
            .into_iter()
            .map(|slot| materialize(&slots, slot))
            .collect();

        Self { separator, roots }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first, parents before children, in first-seen order.
    pub fn rows(&self) -> Vec<TreeRow<'_>> {
        let mut rows = Vec::new();
        for root in &self.roots {
            collect_rows(root, 0, &mut rows);
        }
        rows
    }

    /// Descends only through nodes whose path is a prefix of `name`.
    pub fn find(&self, name: &str) -> Option<&TreeNode> {
        let mut level = &self.roots;
        loop {
            let node = level.iter().find(|node| {
                node.name == name || self.is_descendant_name(&node.name, name)
            })?;
            if node.name == name {
                return Some(node);
            }
            level = &node.children;
        }
    }

    #[cfg(test)]
    pub fn leaf_names(&self) -> Vec<String> {
        self.rows()
            .into_iter()
            .filter(|row| row.node.is_leaf())
            .map(|row| row.node.name.clone())
            .collect()
    }

    /// Every name below `name`, not including `name` itself.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let Some(node) = self.find(name) else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        for child in &node.children {
            collect_rows(child, 0, &mut rows);
        }
        rows.into_iter().map(|row| row.node.name.clone()).collect()
    }

    /// True when `candidate` sits strictly below `ancestor` in path terms.
    pub fn is_descendant_name(&self, ancestor: &str, candidate: &str) -> bool {
        candidate
            .strip_prefix(ancestor)
            .and_then(|rest| rest.strip_prefix(self.separator))
            .is_some()
    }
}

fn materialize(slots: &[(String, Vec<usize>)], slot: usize) -> TreeNode {
    let (name, children) = &slots[slot];
    let mut node = TreeNode::leaf(name.clone());
    node.children = children
        .iter()
        .map(|&child| materialize(slots, child))
        .collect();
    node
}

fn collect_rows<'a>(node: &'a TreeNode, depth: usize, rows: &mut Vec<TreeRow<'a>>) {
    rows.push(TreeRow { node, depth });
    for child in &node.children {
        collect_rows(child, depth + 1, rows);
    }
}

/// The most frequent non-alphanumeric character across all names. Ties go to
/// whichever character was seen first.
pub fn infer_separator<S: AsRef<str>>(names: &[S]) -> char {
    let mut counts: Vec<(char, usize)> = Vec::new();

    for name in names {
        for found in NON_ALPHANUMERIC_RE.find_iter(name.as_ref()) {
            let Some(ch) = found.as_str().chars().next() else {
                continue;
            };
            match counts.iter_mut().find(|(seen, _)| *seen == ch) {
                Some((_, count)) => *count += 1,
                None => counts.push((ch, 1)),
            }
        }
    }

    let mut separator = DEFAULT_SEPARATOR;
    let mut best = 0;
    for (ch, count) in counts {
        if count > best {
            best = count;
            separator = ch;
        }
    }
    separator
}
