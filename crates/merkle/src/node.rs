use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// A content-addressed entry of the workspace.
///
/// Directory hashes derive from their children, so equality of two hashes
/// means equality of the whole subtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: String,
    /// Workspace-relative path with forward slashes; empty for the root.
    pub path: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, MerkleNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<u64>,
    /// File leaves beneath this node, kept so unchanged subtrees are counted in O(1).
    #[serde(default)]
    pub leaf_count: usize,
}

impl MerkleNode {
    pub fn file(path: impl Into<String>, hash: String, size: u64, modified_ms: u64) -> Self {
        Self {
            hash,
            path: path.into(),
            kind: NodeKind::File,
            children: BTreeMap::new(),
            size: Some(size),
            modified_ms: Some(modified_ms),
            leaf_count: 1,
        }
    }

    pub fn directory(path: impl Into<String>, children: BTreeMap<String, MerkleNode>) -> Self {
        let hash = crate::hash::hash_directory(&children);
        let leaf_count = children.values().map(|c| c.leaf_count).sum();
        Self {
            hash,
            path: path.into(),
            kind: NodeKind::Directory,
            children,
            size: None,
            modified_ms: None,
            leaf_count,
        }
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Number of file leaves in this subtree.
    #[must_use]
    pub const fn file_count(&self) -> usize {
        self.leaf_count
    }

    /// Push every file path beneath this node into `out`.
    pub fn collect_files(&self, out: &mut Vec<String>) {
        match self.kind {
            NodeKind::File => out.push(self.path.clone()),
            NodeKind::Directory => {
                for child in self.children.values() {
                    child.collect_files(out);
                }
            }
        }
    }

    fn for_each_file<'a>(&'a self, f: &mut impl FnMut(&'a MerkleNode)) {
        match self.kind {
            NodeKind::File => f(self),
            NodeKind::Directory => {
                for child in self.children.values() {
                    child.for_each_file(f);
                }
            }
        }
    }
}

/// Snapshot of a workspace at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleTree {
    pub root: MerkleNode,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub built_at_ms: u64,
    pub file_count: usize,
}

impl MerkleTree {
    pub fn new(
        root: MerkleNode,
        workspace_id: impl Into<String>,
        revision: Option<String>,
        built_at_ms: u64,
    ) -> Self {
        let file_count = root.file_count();
        Self {
            root,
            workspace_id: workspace_id.into(),
            revision,
            built_at_ms,
            file_count,
        }
    }

    #[must_use]
    pub fn root_hash(&self) -> &str {
        &self.root.hash
    }

    #[must_use]
    pub fn total_files(&self) -> usize {
        self.file_count
    }

    /// Look up a node by workspace-relative path (`""` is the root).
    pub fn find(&self, rel_path: &str) -> Option<&MerkleNode> {
        let mut node = &self.root;
        for part in rel_path.split('/').filter(|p| !p.is_empty()) {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    /// File leaves in path order.
    pub fn files(&self) -> Vec<&MerkleNode> {
        let mut out = Vec::with_capacity(self.file_count);
        self.root.for_each_file(&mut |node| out.push(node));
        out
    }

    pub fn file_paths(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.file_count);
        self.root.collect_files(&mut out);
        out
    }

    /// Content hash recorded for a file, if the tree contains it.
    pub fn file_hash(&self, rel_path: &str) -> Option<&str> {
        self.find(rel_path)
            .filter(|n| n.is_file())
            .map(|n| n.hash.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MerkleTree {
        let mut src = BTreeMap::new();
        src.insert(
            "a.ts".to_string(),
            MerkleNode::file("src/a.ts", "h1".to_string(), 1, 1),
        );
        src.insert(
            "b.ts".to_string(),
            MerkleNode::file("src/b.ts", "h2".to_string(), 1, 1),
        );
        let mut root = BTreeMap::new();
        root.insert("src".to_string(), MerkleNode::directory("src", src));
        root.insert(
            "README.md".to_string(),
            MerkleNode::file("README.md", "h3".to_string(), 1, 1),
        );
        MerkleTree::new(MerkleNode::directory("", root), "ws", None, 0)
    }

    #[test]
    fn counts_and_lookups() {
        let tree = sample();
        assert_eq!(tree.total_files(), 3);
        assert_eq!(tree.file_hash("src/b.ts"), Some("h2"));
        assert!(tree.find("src").is_some_and(MerkleNode::is_dir));
        assert!(tree.find("src/missing.ts").is_none());
        assert_eq!(tree.file_paths(), vec!["README.md", "src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn directory_hash_is_order_independent() {
        let a = MerkleNode::file("x", "hx".to_string(), 1, 1);
        let b = MerkleNode::file("y", "hy".to_string(), 1, 1);
        let mut first = BTreeMap::new();
        first.insert("y".to_string(), b.clone());
        first.insert("x".to_string(), a.clone());
        let mut second = BTreeMap::new();
        second.insert("x".to_string(), a);
        second.insert("y".to_string(), b);
        assert_eq!(
            MerkleNode::directory("", first).hash,
            MerkleNode::directory("", second).hash
        );
    }
}
