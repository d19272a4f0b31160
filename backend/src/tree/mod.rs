//! Path-addressed hierarchical container.
//!
//! A [`DataTree`] is a tree of ordered maps. Every pipeline stage reads and
//! writes it through dimension paths; there is no numeric addressing.
//!
//! ```text
//! root
//! ├── t1                 level 0 (tracks)
//! │   ├── s1             level 1 (slices)
//! │   │   └── v: 10      level 2 (fields)
//! │   └── s2
//! │       └── v: 12
//! └── t2
//!     └── s1
//!         └── v: 20
//! ```
//!
//! Sibling order is insertion order and drives row/column order downstream.
//! The tree is intentionally irregular: label sets may differ between subtrees.

use indexmap::IndexSet;

use crate::models::{Branch, DimensionPath, Node};

/// Ordered, path-addressable nested mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataTree {
    root: Node,
}

impl DataTree {
    /// Create an empty tree (an empty root mapping).
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing node as the tree root.
    pub fn from_node(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn into_node(self) -> Node {
        self.root
    }

    /// True when the root is an empty mapping.
    pub fn is_empty(&self) -> bool {
        matches!(&self.root, Node::Mapping(m) if m.is_empty())
    }

    /// Look up the node at `path`. Stops at the first missing label.
    pub fn get_leaf<S: AsRef<str>>(&self, path: &[S]) -> Option<&Node> {
        let mut node = &self.root;
        for label in path {
            node = node.as_mapping()?.get(label.as_ref())?;
        }
        Some(node)
    }

    /// Mutable lookup. Never creates intermediate branches.
    pub fn get_leaf_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for label in path {
            node = node.as_mapping_mut()?.get_mut(label.as_ref())?;
        }
        Some(node)
    }

    /// Store `value` at `path`, creating intermediate branches on the way.
    ///
    /// An intermediate leaf in the way is replaced by a branch. An empty
    /// path replaces the root.
    pub fn set_leaf<S: AsRef<str>>(&mut self, path: &[S], value: Node) {
        let Some((last, parents)) = path.split_last() else {
            self.root = value;
            return;
        };

        let mut node = &mut self.root;
        for label in parents {
            node = ensure_mapping(node)
                .entry(label.as_ref().to_string())
                .or_insert_with(Node::mapping);
        }
        ensure_mapping(node).insert(last.as_ref().to_string(), value);
    }

    /// Remove and return the node at `path`.
    ///
    /// Removing below a missing parent is a no-op. Removing the empty path
    /// clears the tree.
    pub fn remove_leaf<S: AsRef<str>>(&mut self, path: &[S]) -> Option<Node> {
        let Some((last, parents)) = path.split_last() else {
            return Some(std::mem::take(&mut self.root));
        };
        self.get_leaf_mut(parents)?
            .as_mapping_mut()?
            .shift_remove(last.as_ref())
    }

    /// Ordered distinct label set per depth.
    ///
    /// Breadth-first: collect all labels of the current frontier, deduplicate
    /// in first-seen order, then descend into every child. Stops at the first
    /// depth without branch nodes.
    pub fn get_paths(&self) -> Vec<Vec<String>> {
        let mut levels = Vec::new();
        let mut frontier: Vec<&Node> = vec![&self.root];

        loop {
            let mut labels: IndexSet<&str> = IndexSet::new();
            let mut next = Vec::new();
            for map in frontier.iter().filter_map(|n| n.as_mapping()) {
                for (label, child) in map {
                    labels.insert(label.as_str());
                    next.push(child);
                }
            }
            if labels.is_empty() {
                break;
            }
            levels.push(labels.into_iter().map(String::from).collect());
            frontier = next;
        }

        levels
    }

    /// Number of branch levels.
    pub fn depth(&self) -> usize {
        self.get_paths().len()
    }

    /// Number of leaves (scalars and series).
    pub fn leaf_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Mapping(map) => map.values().map(count).sum(),
                _ => 1,
            }
        }
        count(&self.root)
    }

    /// All existing paths with exactly `depth` labels, in depth-first order.
    pub fn paths_at(&self, depth: usize) -> Vec<DimensionPath> {
        let mut out = Vec::new();
        collect_paths(&self.root, depth, &mut Vec::new(), &mut out);
        out
    }

    /// Paths of every leaf, at whatever depth it sits, in depth-first order.
    pub fn leaf_paths(&self) -> Vec<DimensionPath> {
        fn walk(node: &Node, prefix: &mut Vec<String>, out: &mut Vec<DimensionPath>) {
            match node {
                Node::Mapping(map) => {
                    for (label, child) in map {
                        prefix.push(label.clone());
                        walk(child, prefix, out);
                        prefix.pop();
                    }
                }
                _ => out.push(prefix.clone()),
            }
        }
        let mut out = Vec::new();
        if let Node::Mapping(_) = self.root {
            walk(&self.root, &mut Vec::new(), &mut out);
        }
        out
    }

    /// Split off the top `levels` levels.
    ///
    /// Returns each existing path with exactly `levels` labels together with
    /// the subtree below it, in depth-first order. Projections join these
    /// paths into multi-level headers.
    pub fn flatten(&self, levels: usize) -> Vec<(DimensionPath, &Node)> {
        self.paths_at(levels)
            .into_iter()
            .filter_map(|path| {
                let node = self.get_leaf(&path)?;
                Some((path, node))
            })
            .collect()
    }

    /// Drop empty mappings and empty series anywhere below the root.
    pub fn remove_empty_branches(&mut self) {
        fn sweep(node: &mut Node) {
            if let Node::Mapping(map) = node {
                for child in map.values_mut() {
                    sweep(child);
                }
                map.retain(|_, child| !child.is_empty());
            }
        }
        sweep(&mut self.root);
    }

    /// Remove superfluous levels and return how many were removed.
    ///
    /// A level is superfluous when every node at that depth is a mapping
    /// with exactly one child and that child label is the same everywhere.
    /// The first and last level are kept, so trees with fewer than three
    /// levels are never pruned. Levels made only of `ignore` labels are kept.
    pub fn prune(&mut self, ignore: &[String]) -> usize {
        self.remove_empty_branches();

        let levels = self.get_paths();
        let nlevels = levels.len();
        if nlevels < 3 {
            return 0;
        }

        let mut removed = 0;
        for level in (1..nlevels - 1).rev() {
            let labels = &levels[level];
            if labels.len() != 1 {
                continue;
            }
            if labels.iter().all(|l| ignore.contains(l)) {
                continue;
            }
            if !all_single_child(&self.root, level) {
                continue;
            }
            collapse_level(&mut self.root, level);
            removed += 1;
        }
        removed
    }

    /// Exchange two levels across the whole tree.
    ///
    /// This is a structural transpose: the node found at
    /// `(.., a_label, .., b_label, ..)` moves to `(.., b_label, .., a_label, ..)`.
    /// Leaves sitting above the deeper of the two levels keep their path.
    pub fn swap(self, level_a: usize, level_b: usize) -> DataTree {
        if level_a == level_b {
            return self;
        }
        let deepest = level_a.max(level_b);

        let mut entries = Vec::new();
        drain_entries(self.root, deepest + 1, &mut Vec::new(), &mut entries);

        let mut swapped = DataTree::new();
        for (mut path, node) in entries {
            if path.len() > deepest {
                path.swap(level_a, level_b);
            }
            swapped.set_leaf(&path, node);
        }
        swapped
    }

    /// Wrap the whole tree in a synthetic single-label level.
    pub fn wrap(self, label: &str) -> DataTree {
        let mut map = Branch::new();
        map.insert(label.to_string(), self.root);
        DataTree::from_node(Node::Mapping(map))
    }
}

impl From<Node> for DataTree {
    fn from(root: Node) -> Self {
        DataTree::from_node(root)
    }
}

/// Cartesian product of label sets, in order.
///
/// No levels yield a single empty path; any empty level yields no paths.
pub fn cartesian_product(levels: &[Vec<String>]) -> Vec<DimensionPath> {
    let mut paths: Vec<DimensionPath> = vec![Vec::new()];
    for labels in levels {
        let mut next = Vec::with_capacity(paths.len() * labels.len());
        for prefix in &paths {
            for label in labels {
                let mut path = prefix.clone();
                path.push(label.clone());
                next.push(path);
            }
        }
        paths = next;
    }
    paths
}

fn ensure_mapping(node: &mut Node) -> &mut Branch {
    if !matches!(node, Node::Mapping(_)) {
        *node = Node::mapping();
    }
    match node {
        Node::Mapping(map) => map,
        _ => unreachable!("node was just replaced by a mapping"),
    }
}

fn collect_paths(node: &Node, depth: usize, prefix: &mut Vec<String>, out: &mut Vec<DimensionPath>) {
    if prefix.len() == depth {
        out.push(prefix.clone());
        return;
    }
    if let Node::Mapping(map) = node {
        for (label, child) in map {
            prefix.push(label.clone());
            collect_paths(child, depth, prefix, out);
            prefix.pop();
        }
    }
}

fn drain_entries(node: Node, depth: usize, prefix: &mut Vec<String>, out: &mut Vec<(DimensionPath, Node)>) {
    if prefix.len() == depth {
        out.push((prefix.clone(), node));
        return;
    }
    match node {
        Node::Mapping(map) => {
            for (label, child) in map {
                prefix.push(label);
                drain_entries(child, depth, prefix, out);
                prefix.pop();
            }
        }
        leaf => out.push((prefix.clone(), leaf)),
    }
}

fn all_single_child(node: &Node, depth: usize) -> bool {
    match node {
        Node::Mapping(map) if depth == 0 => map.len() == 1,
        Node::Mapping(map) => map.values().all(|child| all_single_child(child, depth - 1)),
        // leaves above the level do not reach it
        _ => depth > 0,
    }
}

fn collapse_level(node: &mut Node, depth: usize) {
    let Node::Mapping(map) = node else {
        return;
    };
    if depth == 0 {
        if let Some((_, child)) = map.pop() {
            *node = child;
        }
        return;
    }
    for child in map.values_mut() {
        collapse_level(child, depth - 1);
    }
}
