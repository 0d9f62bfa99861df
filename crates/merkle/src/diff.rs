use crate::node::{MerkleNode, MerkleTree, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of comparing two trees.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
    /// Node pairs compared; proportional to the changed region, not the tree.
    #[serde(default)]
    pub nodes_visited: usize,
}

impl TreeDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Added and modified paths, i.e. the files that need re-parsing.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .added
            .iter()
            .chain(&self.modified)
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Every path touched by the diff, deletions included.
    pub fn affected_paths(&self) -> Vec<String> {
        let mut out = self.changed_paths();
        out.extend(self.deleted.iter().cloned());
        out.sort();
        out
    }
}

/// Compare `old` against `new`, descending only where subtree hashes differ.
pub fn diff(old: &MerkleTree, new: &MerkleTree) -> TreeDiff {
    let mut out = TreeDiff::default();
    if same_subtree(&old.root, &new.root) {
        out.nodes_visited = 1;
        out.unchanged = new.root.file_count();
        return out;
    }
    diff_nodes(&old.root, &new.root, &mut out);
    out.added.sort();
    out.modified.sort();
    out.deleted.sort();
    out
}

/// Treat every file in `tree` as added (no previous tree to compare against).
pub fn diff_from_empty(tree: &MerkleTree) -> TreeDiff {
    let mut out = TreeDiff::default();
    tree.root.collect_files(&mut out.added);
    out.nodes_visited = 1;
    out
}

fn same_subtree(old: &MerkleNode, new: &MerkleNode) -> bool {
    old.kind == new.kind && old.hash == new.hash
}

/// Called only for pairs whose hashes differ.
fn diff_nodes(old: &MerkleNode, new: &MerkleNode, out: &mut TreeDiff) {
    out.nodes_visited += 1;

    match (old.kind, new.kind) {
        (NodeKind::File, NodeKind::File) => out.modified.push(new.path.clone()),
        (NodeKind::Directory, NodeKind::Directory) => {
            let names: BTreeSet<&String> =
                old.children.keys().chain(new.children.keys()).collect();
            for name in names {
                match (old.children.get(name), new.children.get(name)) {
                    (Some(o), Some(n)) if same_subtree(o, n) => {
                        out.unchanged += n.file_count();
                    }
                    (Some(o), Some(n)) => diff_nodes(o, n, out),
                    (None, Some(n)) => n.collect_files(&mut out.added),
                    (Some(o), None) => o.collect_files(&mut out.deleted),
                    (None, None) => {}
                }
            }
        }
        // A file replaced by a directory (or the reverse) at the same path.
        _ => {
            old.collect_files(&mut out.deleted);
            new.collect_files(&mut out.added);
        }
    }
}
