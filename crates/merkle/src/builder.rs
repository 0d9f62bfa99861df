use crate::batch;
use crate::error::{MerkleError, Result};
use crate::hash::{hash_file, workspace_id};
use crate::ignore::{IgnoreMatcher, DEFAULT_IGNORE_GLOBS};
use crate::node::{MerkleNode, MerkleTree};
use crate::vcs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Globs matched against workspace-relative paths; matches are not walked.
    pub ignore: Vec<String>,
    pub follow_symlinks: bool,
    /// Mix size and mtime into file hashes (a touch registers as a change).
    pub hash_metadata: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORE_GLOBS.iter().map(|s| (*s).to_string()).collect(),
            follow_symlinks: false,
            hash_metadata: true,
        }
    }
}

/// Walks a workspace into a [`MerkleTree`].
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    matcher: IgnoreMatcher,
    config: BuilderConfig,
    concurrency: usize,
}

struct WalkedFile {
    rel: String,
    abs: PathBuf,
    size: u64,
    modified_ms: u64,
}

#[derive(Default)]
struct WalkOutput {
    files: Vec<WalkedFile>,
    dirs: Vec<String>,
    skipped: usize,
}

impl TreeBuilder {
    pub fn new(config: BuilderConfig) -> Result<Self> {
        let matcher = IgnoreMatcher::new(&config.ignore)?;
        Ok(Self {
            matcher,
            config,
            concurrency: batch::concurrency_limit(),
        })
    }

    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn matcher(&self) -> &IgnoreMatcher {
        &self.matcher
    }

    /// Build a tree, tagging it with the workspace's git revision when available.
    pub async fn build(&self, workspace: &Path) -> Result<MerkleTree> {
        let root = canonical_root(workspace)?;
        let revision = vcs::probe_revision(&root).await;
        self.build_at(&root, revision).await
    }

    /// Build a tree with a revision supplied by the caller.
    pub async fn build_with_revision(
        &self,
        workspace: &Path,
        revision: Option<String>,
    ) -> Result<MerkleTree> {
        let root = canonical_root(workspace)?;
        self.build_at(&root, revision).await
    }

    async fn build_at(&self, root: &Path, revision: Option<String>) -> Result<MerkleTree> {
        let started = Instant::now();

        let walk_root = root.to_path_buf();
        let matcher = self.matcher.clone();
        let follow = self.config.follow_symlinks;
        let walked = tokio::task::spawn_blocking(move || walk_workspace(&walk_root, &matcher, follow))
            .await
            .map_err(|e| MerkleError::Other(format!("walk task failed: {e}")))?;

        let hash_metadata = self.config.hash_metadata;
        let files = walked.files;
        let hashed = batch::run_blocking(files, self.concurrency, move |file: WalkedFile| {
            hash_walked_file(file, hash_metadata)
        })
        .await;

        let mut root_dir = DirAccumulator::default();
        for dir in &walked.dirs {
            root_dir.ensure_dir(dir);
        }
        let mut unreadable = 0usize;
        for node in hashed.into_iter().flatten() {
            match node {
                Some(node) => root_dir.insert_file(node),
                None => unreadable += 1,
            }
        }

        let root_node = root_dir.finish(String::new());
        let tree = MerkleTree::new(root_node, workspace_id(root), revision, now_ms());

        log::info!(
            "Built Merkle tree for {}: {} files ({} unreadable, {} skipped) in {:?}",
            root.display(),
            tree.file_count,
            unreadable,
            walked.skipped,
            started.elapsed()
        );
        Ok(tree)
    }
}

fn canonical_root(workspace: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(workspace).map_err(|e| {
        MerkleError::InvalidPath(format!("{}: {e}", workspace.display()))
    })?;
    if !root.is_dir() {
        return Err(MerkleError::InvalidPath(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    Ok(root)
}

fn walk_workspace(root: &Path, matcher: &IgnoreMatcher, follow_symlinks: bool) -> WalkOutput {
    let mut out = WalkOutput::default();
    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            match rel_path(root, entry.path()) {
                Some(rel) => !matcher.is_ignored(&rel),
                None => false,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Skipping unreadable entry: {err}");
                out.skipped += 1;
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let Some(rel) = rel_path(root, entry.path()) else {
            continue;
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            out.dirs.push(rel);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                log::warn!("Skipping {}: {err}", entry.path().display());
                out.skipped += 1;
                continue;
            }
        };
        out.files.push(WalkedFile {
            rel,
            abs: entry.path().to_path_buf(),
            size: meta.len(),
            modified_ms: meta.modified().map(system_time_ms).unwrap_or(0),
        });
    }
    out
}

fn hash_walked_file(file: WalkedFile, hash_metadata: bool) -> Option<MerkleNode> {
    match std::fs::read(&file.abs) {
        Ok(content) => {
            let hash = hash_file(
                &content,
                &file.rel,
                file.size,
                file.modified_ms,
                hash_metadata,
            );
            Some(MerkleNode::file(file.rel, hash, file.size, file.modified_ms))
        }
        Err(err) => {
            log::warn!("Skipping unreadable file {}: {err}", file.abs.display());
            None
        }
    }
}

pub(crate) fn rel_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn system_time_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn now_ms() -> u64 {
    system_time_ms(SystemTime::now())
}

#[derive(Default)]
struct DirAccumulator {
    dirs: BTreeMap<String, DirAccumulator>,
    files: BTreeMap<String, MerkleNode>,
}

impl DirAccumulator {
    fn ensure_dir(&mut self, rel: &str) -> &mut DirAccumulator {
        let mut current = self;
        for part in rel.split('/').filter(|p| !p.is_empty()) {
            current = current.dirs.entry(part.to_string()).or_default();
        }
        current
    }

    fn insert_file(&mut self, node: MerkleNode) {
        let (parent, name) = match node.path.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), node.path.clone()),
        };
        self.ensure_dir(&parent).files.insert(name, node);
    }

    fn finish(self, path: String) -> MerkleNode {
        let mut children = self.files;
        for (name, dir) in self.dirs {
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}/{name}")
            };
            children.insert(name, dir.finish(child_path));
        }
        MerkleNode::directory(path, children)
    }
}
