//! Digest helpers. All hashes are lowercase hex SHA-256.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::node::MerkleNode;

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Leaf digest: content bytes followed by the identity of the entry.
///
/// With `include_metadata` off only the content (and path) participate, so a
/// bare `touch` no longer registers as a modification.
pub fn hash_file(
    content: &[u8],
    rel_path: &str,
    size: u64,
    modified_ms: u64,
    include_metadata: bool,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.update(b"\0");
    hasher.update(rel_path.as_bytes());
    if include_metadata {
        hasher.update(b"\0");
        hasher.update(size.to_le_bytes());
        hasher.update(modified_ms.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Directory digest over the sorted `name:hash` pairs of its children.
pub fn hash_directory(children: &BTreeMap<String, MerkleNode>) -> String {
    let mut hasher = Sha256::new();
    for (name, child) in children {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(child.hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Short stable identifier for a workspace root.
pub fn workspace_id(root: &std::path::Path) -> String {
    let digest = hash_bytes(root.to_string_lossy().as_bytes());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_hash_depends_on_content_and_metadata() {
        let base = hash_file(b"abc", "a.rs", 3, 10, true);
        assert_eq!(base, hash_file(b"abc", "a.rs", 3, 10, true));
        assert_ne!(base, hash_file(b"abd", "a.rs", 3, 10, true));
        assert_ne!(base, hash_file(b"abc", "b.rs", 3, 10, true));
        assert_ne!(base, hash_file(b"abc", "a.rs", 3, 11, true));
    }

    #[test]
    fn content_only_mode_ignores_mtime() {
        let a = hash_file(b"abc", "a.rs", 3, 10, false);
        let b = hash_file(b"abc", "a.rs", 3, 99, false);
        assert_eq!(a, b);
    }

    #[test]
    fn workspace_id_is_short_and_stable() {
        let id = workspace_id(std::path::Path::new("/repo"));
        assert_eq!(id.len(), 16);
        assert_eq!(id, workspace_id(std::path::Path::new("/repo")));
    }
}
