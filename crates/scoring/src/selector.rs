use crate::error::Result;
use crate::rules::{build_globset, CompiledRules};
use context_merkle::{IgnoreMatcher, MerkleTree};
use context_protocol::{normalize_rel_path, GenerateOptions};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
pub const CONTEXT_IGNORE_FILE: &str = ".contextignore";

const SNIFF_BYTES: usize = 1024;

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "pdf", "zip", "gz", "tgz",
    "bz2", "xz", "7z", "rar", "tar", "jar", "war", "class", "exe", "dll", "so", "dylib", "o", "a",
    "lib", "obj", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "ogg", "mov",
    "avi", "webm", "sqlite", "db", "bin", "dat", "pyc", "pyo", "node",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub max_file_size: u64,
    /// Read a file's head to catch binaries with text-looking names.
    pub sniff_binary: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            sniff_binary: true,
        }
    }
}

/// Candidate set for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Workspace-relative, sorted, deduplicated.
    pub files: Vec<String>,
    /// Paths named explicitly that do not exist inside the workspace.
    pub missing: Vec<String>,
    /// Binary, oversized or excluded candidates dropped.
    pub skipped: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Explicit,
    Implicit,
}

/// Resolves explicit files, folders, patterns and ignore files into candidates.
pub struct FileSelector {
    root: PathBuf,
    ignore: IgnoreMatcher,
    rules: CompiledRules,
    config: SelectorConfig,
}

impl FileSelector {
    pub fn new(
        root: impl AsRef<Path>,
        ignore: IgnoreMatcher,
        rules: CompiledRules,
        config: SelectorConfig,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ignore,
            rules,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the candidates for `options`, falling back to every file of `tree`
    /// (or a walk of the root) when no selector is given.
    pub fn select(&self, options: &GenerateOptions, tree: Option<&MerkleTree>) -> Result<Selection> {
        let mut candidates: BTreeMap<String, Origin> = BTreeMap::new();
        let mut selection = Selection::default();

        for raw in &options.files {
            let rel = normalize_rel_path(raw);
            if self.resolve_inside(&rel).is_some_and(|p| p.is_file()) {
                candidates.insert(rel, Origin::Explicit);
            } else {
                log::warn!("Requested file not found in workspace: {raw}");
                selection.missing.push(rel);
            }
        }

        for raw in &options.folders {
            let rel = normalize_rel_path(raw);
            match self.resolve_inside(&rel) {
                Some(dir) if dir.is_dir() => {
                    for path in self.walk(&dir, &options.ignore_files) {
                        candidates.entry(path).or_insert(Origin::Implicit);
                    }
                }
                _ => {
                    log::warn!("Requested folder not found in workspace: {raw}");
                    selection.missing.push(rel);
                }
            }
        }

        if !options.patterns.is_empty() {
            let set = build_globset(&options.patterns)?;
            let universe = self.universe(tree, &options.ignore_files);
            let before = candidates.len();
            for path in universe.into_iter().filter(|p| set.is_match(p)) {
                candidates.entry(path).or_insert(Origin::Implicit);
            }
            log::debug!(
                "Patterns {:?} matched {} files",
                options.patterns,
                candidates.len() - before
            );
        }

        let unselected =
            options.files.is_empty() && options.folders.is_empty() && options.patterns.is_empty();
        if unselected {
            for path in self.universe(tree, &options.ignore_files) {
                candidates.insert(path, Origin::Implicit);
            }
        }

        let sizes: BTreeMap<&str, u64> = tree
            .map(|t| {
                t.files()
                    .into_iter()
                    .filter_map(|n| n.size.map(|s| (n.path.as_str(), s)))
                    .collect()
            })
            .unwrap_or_default();

        for (path, origin) in candidates {
            if origin == Origin::Implicit && self.rules.is_excluded(&path) {
                selection.skipped += 1;
                continue;
            }
            let size = match sizes.get(path.as_str()) {
                Some(size) => Some(*size),
                None => std::fs::metadata(self.root.join(&path)).ok().map(|m| m.len()),
            };
            if size.is_some_and(|s| s > self.config.max_file_size) {
                log::debug!("Skipping large file {path} ({} bytes)", size.unwrap_or_default());
                selection.skipped += 1;
                continue;
            }
            if self.is_binary(&path) {
                log::debug!("Skipping binary file {path}");
                selection.skipped += 1;
                continue;
            }
            selection.files.push(path);
        }

        log::info!(
            "Selected {} candidate files ({} skipped, {} missing)",
            selection.files.len(),
            selection.skipped,
            selection.missing.len()
        );
        Ok(selection)
    }

    /// Absolute path of `rel` if it stays inside the workspace.
    fn resolve_inside(&self, rel: &str) -> Option<PathBuf> {
        if rel.is_empty() {
            return Some(self.root.clone());
        }
        let joined = self.root.join(rel);
        let canonical = std::fs::canonicalize(&joined).ok()?;
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        canonical.starts_with(&root).then_some(joined)
    }

    fn universe(&self, tree: Option<&MerkleTree>, ignore_files: &[String]) -> BTreeSet<String> {
        match tree {
            Some(tree) if ignore_files.is_empty() => tree.file_paths().into_iter().collect(),
            _ => self.walk(&self.root, ignore_files).into_iter().collect(),
        }
    }

    /// Ignore-aware walk of `start`, honoring `.gitignore`, `.contextignore`
    /// and any extra ignore files.
    fn walk(&self, start: &Path, ignore_files: &[String]) -> Vec<String> {
        let mut builder = WalkBuilder::new(start);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .add_custom_ignore_filename(CONTEXT_IGNORE_FILE);
        for file in ignore_files {
            let path = self.root.join(normalize_rel_path(file));
            if let Some(err) = builder.add_ignore(&path) {
                log::warn!("Ignoring unreadable ignore file {}: {err}", path.display());
            }
        }
        let root = self.root.clone();
        let matcher = self.ignore.clone();
        builder.filter_entry(move |entry| match relative(&root, entry.path()) {
            Some(rel) => !matcher.is_ignored(&rel),
            None => true,
        });

        let mut out = Vec::new();
        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    if let Some(rel) = relative(&self.root, entry.path()) {
                        out.push(rel);
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }
        out.sort();
        out
    }

    fn is_binary(&self, rel: &str) -> bool {
        let ext = rel
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
        self.config.sniff_binary && sniff_nul(&self.root.join(rel))
    }
}

fn sniff_nul(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    if file.take(SNIFF_BYTES as u64).read_to_end(&mut head).is_err() {
        return false;
    }
    head.contains(&0)
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Reject selector inputs that cannot be compiled before touching the disk.
pub fn validate_patterns(patterns: &[String]) -> Result<()> {
    build_globset(patterns).map(|_| ())
}
