use context_merkle::{diff, BuilderConfig, MerkleNode, MerkleTree, TreeBuilder};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn content_only_builder() -> TreeBuilder {
    TreeBuilder::new(BuilderConfig {
        hash_metadata: false,
        ..BuilderConfig::default()
    })
    .unwrap()
}

fn populate(root: &Path) {
    write(root, "src/a.ts", "export const a = 1;\n");
    write(root, "src/b.ts", "export function b() { return 2; }\n");
    write(root, "src/lib/c.ts", "export class C {}\n");
    write(root, "docs/readme.md", "# docs\n");
}

#[tokio::test]
async fn identical_content_yields_identical_root_hash() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    populate(first.path());
    populate(second.path());

    let builder = content_only_builder();
    let a = builder.build_with_revision(first.path(), None).await.unwrap();
    let b = builder.build_with_revision(second.path(), None).await.unwrap();

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(a.total_files(), 4);
}

#[tokio::test]
async fn single_byte_change_propagates_to_ancestors_only() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let builder = content_only_builder();
    let before = builder.build_with_revision(temp.path(), None).await.unwrap();

    write(temp.path(), "src/lib/c.ts", "export class D {}\n");
    let after = builder.build_with_revision(temp.path(), None).await.unwrap();

    for changed in ["src/lib/c.ts", "src/lib", "src", ""] {
        assert_ne!(
            before.find(changed).unwrap().hash,
            after.find(changed).unwrap().hash,
            "{changed} should change"
        );
    }
    for sibling in ["src/a.ts", "src/b.ts", "docs", "docs/readme.md"] {
        assert_eq!(
            before.find(sibling).unwrap().hash,
            after.find(sibling).unwrap().hash,
            "{sibling} should not change"
        );
    }
}

#[tokio::test]
async fn diff_of_a_tree_with_itself_is_empty() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let tree = content_only_builder()
        .build_with_revision(temp.path(), None)
        .await
        .unwrap();

    let d = diff(&tree, &tree);
    assert!(d.added.is_empty() && d.modified.is_empty() && d.deleted.is_empty());
    assert_eq!(d.unchanged, tree.total_files());
}

#[tokio::test]
async fn successive_builds_differing_in_one_file() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let builder = content_only_builder();
    let before = builder.build_with_revision(temp.path(), None).await.unwrap();

    write(temp.path(), "src/b.ts", "export function b() { return 3; }\n");
    let after = builder.build_with_revision(temp.path(), None).await.unwrap();

    let d = diff(&before, &after);
    assert_eq!(d.modified, vec!["src/b.ts".to_string()]);
    assert!(d.added.is_empty());
    assert!(d.deleted.is_empty());
    assert_eq!(d.unchanged, after.total_files() - 1);
}

#[tokio::test]
async fn touch_registers_as_modified_when_metadata_is_hashed() {
    let temp = TempDir::new().unwrap();
    populate(temp.path());
    let builder = TreeBuilder::new(BuilderConfig::default()).unwrap();
    let before = builder.build_with_revision(temp.path(), None).await.unwrap();

    let path = temp.path().join("src/a.ts");
    let file = fs::File::options().write(true).open(&path).unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
    file.set_modified(later).unwrap();
    drop(file);

    let after = builder.build_with_revision(temp.path(), None).await.unwrap();
    assert_eq!(diff(&before, &after).modified, vec!["src/a.ts".to_string()]);

}

/// Wide, deep synthetic tree: 8 directories per level, 4 levels, 8 files per leaf dir.
fn synthetic(level: usize, prefix: &str, bump: Option<&str>) -> MerkleNode {
    let mut children = BTreeMap::new();
    if level == 0 {
        for f in 0..8 {
            let path = format!("{prefix}/f{f}.ts");
            let hash = if bump == Some(path.as_str()) {
                "changed".to_string()
            } else {
                format!("h-{path}")
            };
            children.insert(format!("f{f}.ts"), MerkleNode::file(path, hash, 1, 1));
        }
    } else {
        for d in 0..8 {
            let path = if prefix.is_empty() {
                format!("d{d}")
            } else {
                format!("{prefix}/d{d}")
            };
            children.insert(format!("d{d}"), synthetic(level - 1, &path, bump));
        }
    }
    MerkleNode::directory(prefix, children)
}

#[test]
fn diff_cost_tracks_depth_not_size() {
    let old = MerkleTree::new(synthetic(4, "", None), "ws", None, 0);
    let target = "d3/d1/d4/d7/f5.ts";
    let new = MerkleTree::new(synthetic(4, "", Some(target)), "ws", None, 0);

    let d = diff(&old, &new);
    assert_eq!(d.modified, vec![target.to_string()]);
    assert_eq!(d.unchanged, old.total_files() - 1);
    // root + four directories + the leaf
    assert_eq!(d.nodes_visited, 6);
    assert!(old.total_files() > 30_000);
}
