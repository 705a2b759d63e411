//! Deduplicated layer hierarchy with stable ids.
//!
//! Every distinct cumulative path (levels from the top down to a node) owns
//! exactly one [`TreeNode`]. Ids are handed out in first-seen order by
//! [`HierarchyIndex::lookup_or_insert`], the only way nodes are created, so
//! id stability reduces to the order in which paths are presented.
//!
//! The batch pass used by the pipeline is:
//!
//! 1. [`insertion_order`]: stable sort by numeric block index, names without
//!    one last.
//! 2. [`HierarchyBuilder::insert_all`]: level-order insertion, so all groups
//!    receive ids before any member and block 0 precedes block 1 at each depth.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SummaryError};
use crate::naming::{HierarchyLevels, LayerName, NamingRule};

/// Id reserved for the synthetic root.
pub const ROOT_ID: usize = 0;

/// One node of the layer tree, as written to the tree file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Sequential id, in creation order.
    pub id: usize,
    /// Label of this level (not the full path).
    pub name: String,
    /// Parent id, `None` for top-level nodes.
    pub parent: Option<usize>,
}

/// Registry of path → node.
#[derive(Debug, Clone)]
pub struct HierarchyIndex {
    separator: String,
    nodes: Vec<TreeNode>,
    paths: Vec<Vec<String>>,
    ids: HashMap<Vec<String>, usize>,
}

impl HierarchyIndex {
    /// Create an index holding only the synthetic root at [`ROOT_ID`].
    #[must_use]
    pub fn new(root: &str, separator: &str) -> Self {
        let mut index = Self {
            separator: separator.to_owned(),
            nodes: Vec::new(),
            paths: Vec::new(),
            ids: HashMap::new(),
        };
        index.push(vec![root.to_owned()], None);
        index
    }

    fn push(&mut self, path: Vec<String>, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        let name = path.last().cloned().unwrap_or_default();
        self.nodes.push(TreeNode { id, name, parent });
        self.ids.insert(path.clone(), id);
        self.paths.push(path);
        id
    }

    /// Return the id of `path`, creating the node if it is new.
    ///
    /// The parent of a path is the path without its last level; a path of
    /// length one is a top-level node.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::OrphanPathInvariantViolation`] if the parent
    /// path has not been registered, and [`SummaryError::MalformedName`] for
    /// an empty path.
    pub fn lookup_or_insert(&mut self, path: &[String]) -> Result<usize> {
        if let Some(&id) = self.ids.get(path) {
            return Ok(id);
        }
        let Some((_, parent_path)) = path.split_last() else {
            return Err(SummaryError::MalformedName(String::new()));
        };
        let parent = if parent_path.is_empty() {
            None
        } else {
            let id = self.ids.get(parent_path).copied().ok_or_else(|| {
                SummaryError::OrphanPathInvariantViolation {
                    path: path.join(&self.separator),
                    parent: parent_path.join(&self.separator),
                }
            })?;
            Some(id)
        };
        let id = self.push(path.to_vec(), parent);
        tracing::trace!(id, path = %path.join(&self.separator), "registered node");
        Ok(id)
    }

    /// Id of an existing path.
    #[must_use]
    pub fn get(&self, path: &[String]) -> Option<usize> {
        self.ids.get(path).copied()
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: usize) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Full path of a node, joined with the separator.
    #[must_use]
    pub fn path_of(&self, id: usize) -> Option<String> {
        self.paths.get(id).map(|p| p.join(&self.separator))
    }

    /// All nodes in creation order.
    #[must_use]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of nodes, including the synthetic root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the synthetic root is created with the index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `id`, in creation order.
    pub fn children(&self, id: usize) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(move |n| n.parent == Some(id))
    }

    /// Indented text rendering, one node per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut tops = Vec::new();
        for node in &self.nodes {
            match node.parent {
                Some(parent) => children[parent].push(node.id),
                None => tops.push(node.id),
            }
        }

        let mut out = String::new();
        let mut stack: Vec<(usize, usize)> = tops.into_iter().rev().map(|id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let node = &self.nodes[id];
            let _ = writeln!(out, "{}{} [{}]", "  ".repeat(depth), node.name, node.id);
            stack.extend(children[id].iter().rev().map(|&c| (c, depth + 1)));
        }
        out
    }
}

/// Builds a [`HierarchyIndex`] from decomposed layer names.
#[derive(Debug, Clone)]
pub struct HierarchyBuilder {
    root: String,
    index: HierarchyIndex,
}

impl HierarchyBuilder {
    /// Start a tree whose synthetic root and separator come from `rule`.
    #[must_use]
    pub fn new(rule: &NamingRule) -> Self {
        Self {
            root: rule.root.clone(),
            index: HierarchyIndex::new(&rule.root, &rule.separator),
        }
    }

    /// Cumulative path of the leaf for `levels`.
    ///
    /// Single-level names hang off the synthetic root; nested names start at
    /// their own root token, which is the synthetic root when the labels match.
    #[must_use]
    pub fn leaf_path(&self, levels: &HierarchyLevels) -> Vec<String> {
        match levels {
            HierarchyLevels::Single(name) => vec![self.root.clone(), name.clone()],
            HierarchyLevels::Nested { .. } => {
                levels.labels().into_iter().map(str::to_owned).collect()
            }
        }
    }

    /// Insert one name root-to-leaf and return the leaf id.
    pub fn insert(&mut self, levels: &HierarchyLevels) -> Result<usize> {
        let path = self.leaf_path(levels);
        let mut id = ROOT_ID;
        for depth in 1..=path.len() {
            id = self.index.lookup_or_insert(&path[..depth])?;
        }
        Ok(id)
    }

    /// Insert a batch level by level and return the leaf id of each entry.
    ///
    /// Depth `d` prefixes of every entry are registered, in input order,
    /// before any depth `d + 1` prefix.
    pub fn insert_all(&mut self, levels: &[HierarchyLevels]) -> Result<Vec<usize>> {
        let paths: Vec<Vec<String>> = levels.iter().map(|l| self.leaf_path(l)).collect();
        let max_depth = paths.iter().map(Vec::len).max().unwrap_or(0);
        for depth in 1..=max_depth {
            for path in paths.iter().filter(|p| p.len() >= depth) {
                self.index.lookup_or_insert(&path[..depth])?;
            }
        }
        paths
            .iter()
            .map(|path| {
                self.index.get(path).ok_or_else(|| {
                    SummaryError::OrphanPathInvariantViolation {
                        path: path.join(&self.index.separator),
                        parent: String::new(),
                    }
                })
            })
            .collect()
    }

    /// Borrow the index built so far.
    #[must_use]
    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    /// Finish building; the index is read-only from here on.
    #[must_use]
    pub fn finish(self) -> HierarchyIndex {
        self.index
    }
}

/// Positions of `layers` in insertion order.
///
/// Stable sort on the numeric block index; names without one sort after every
/// indexed name and keep their relative order.
#[must_use]
pub fn insertion_order(layers: &[LayerName]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..layers.len()).collect();
    order.sort_by_key(|&i| match layers[i].block_index {
        Some(block) => (false, block),
        None => (true, 0),
    });
    order
}
