use crate::memory::{CacheKey, CachePayload, MemoryTier};
use crate::metrics::{CacheMetrics, CacheOperation, CacheStats};
use crate::store::DurableStore;
use crate::types::{AccessPattern, CachedCodeMap, CoOccurrence};
use context_merkle::MerkleTree;
use context_symbols::ParsedFile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_MEMORY_CEILING: usize = 64 * 1024 * 1024;

/// Revision key used for trees built outside version control.
pub const WORKTREE_REVISION: &str = "worktree";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_ceiling_bytes: usize,
    /// SQLite file for the durable tier.
    pub durable_path: Option<PathBuf>,
    pub durable: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ceiling_bytes: DEFAULT_MEMORY_CEILING,
            durable_path: None,
            durable: true,
        }
    }
}

/// Read-through, write-through cache over the memory and durable tiers.
///
/// Durable failures are logged and absorbed; the cache keeps serving from
/// memory. Everything stored here can be re-derived from the workspace.
#[derive(Debug)]
pub struct CacheManager {
    memory: Mutex<MemoryTier>,
    durable: Option<DurableStore>,
    metrics: Mutex<CacheMetrics>,
    durable_errors: AtomicU64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn revision_key(revision: Option<&str>) -> &str {
    revision.unwrap_or(WORKTREE_REVISION)
}

impl CacheManager {
    /// Open both tiers. A durable tier that fails to open leaves the cache memory-only.
    pub fn new(config: &CacheConfig) -> Self {
        let durable = match (&config.durable_path, config.durable) {
            (Some(path), true) => match DurableStore::open(path) {
                Ok(store) => Some(store),
                Err(err) => {
                    log::warn!(
                        "Durable cache unavailable at {}, continuing in memory: {err}",
                        path.display()
                    );
                    None
                }
            },
            _ => None,
        };
        Self::with_store(config.memory_ceiling_bytes, durable)
    }

    pub fn memory_only(ceiling_bytes: usize) -> Self {
        Self::with_store(ceiling_bytes, None)
    }

    pub fn with_store(ceiling_bytes: usize, durable: Option<DurableStore>) -> Self {
        let mut metrics = CacheMetrics::default();
        if let Some(store) = &durable {
            match store.load_metrics() {
                Ok(rows) => {
                    for (name, counters) in rows {
                        if let Some(op) = CacheOperation::parse(&name) {
                            metrics.seed(op, counters);
                        }
                    }
                }
                Err(err) => log::warn!("Failed to load cache metrics: {err}"),
            }
        }
        Self {
            memory: Mutex::new(MemoryTier::new(ceiling_bytes)),
            durable,
            metrics: Mutex::new(metrics),
            durable_errors: AtomicU64::new(0),
        }
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Run a durable-tier operation, absorbing failures.
    fn with_durable<R>(&self, what: &str, op: impl FnOnce(&DurableStore) -> crate::Result<R>) -> Option<R> {
        let store = self.durable.as_ref()?;
        match op(store) {
            Ok(value) => Some(value),
            Err(err) => {
                self.durable_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("Durable cache {what} failed: {err}");
                None
            }
        }
    }

    fn record(&self, op: CacheOperation, hit: bool) {
        lock(&self.metrics).record(op, hit);
        self.with_durable("metrics update", |store| store.bump_metric(op.as_str(), hit));
    }

    fn memory_get(&self, key: &CacheKey) -> Option<CachePayload> {
        lock(&self.memory).get(key, now_ms())
    }

    fn memory_put(&self, key: CacheKey, payload: CachePayload, size: usize) {
        lock(&self.memory).insert(key, payload, size, now_ms());
    }

    fn decode<T: DeserializeOwned>(&self, what: &str, raw: &str) -> Option<T> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("Discarding undecodable cached {what}: {err}");
                None
            }
        }
    }

    fn encode<T: Serialize>(what: &str, value: &T) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(raw) => Some(raw),
            Err(err) => {
                log::warn!("Failed to serialize {what} for cache: {err}");
                None
            }
        }
    }

    // ── Merkle trees ─────────────────────────────────────────────────────────

    pub fn get_tree(&self, workspace: &str, revision: Option<&str>) -> Option<Arc<MerkleTree>> {
        let key = CacheKey::Tree {
            workspace: workspace.to_string(),
            revision: revision_key(revision).to_string(),
        };
        if let Some(CachePayload::Tree(tree)) = self.memory_get(&key) {
            self.record(CacheOperation::MerkleTree, true);
            return Some(tree);
        }
        let raw = self
            .with_durable("tree read", |s| s.load_tree(workspace, revision_key(revision)))
            .flatten();
        let found = raw.and_then(|raw| {
            let tree: MerkleTree = self.decode("tree", &raw)?;
            let tree = Arc::new(tree);
            self.memory_put(key, CachePayload::Tree(tree.clone()), raw.len());
            Some(tree)
        });
        self.record(CacheOperation::MerkleTree, found.is_some());
        found
    }

    pub fn save_tree(&self, tree: Arc<MerkleTree>) {
        let revision = revision_key(tree.revision.as_deref()).to_string();
        let Some(raw) = Self::encode("tree", tree.as_ref()) else {
            return;
        };
        let now = now_ms();
        self.with_durable("tree write", |s| {
            s.save_tree(
                &tree.workspace_id,
                &revision,
                &raw,
                tree.root_hash(),
                tree.total_files(),
                now,
            )
        });
        let key = CacheKey::Tree {
            workspace: tree.workspace_id.clone(),
            revision,
        };
        self.memory_put(key, CachePayload::Tree(tree), raw.len());
    }

    // ── Parsed files ─────────────────────────────────────────────────────────

    /// Entries are keyed by content hash, so a hit is never stale.
    pub fn get_parsed_file(&self, path: &str, content_hash: &str) -> Option<Arc<ParsedFile>> {
        let key = CacheKey::Parsed {
            path: path.to_string(),
            hash: content_hash.to_string(),
        };
        if let Some(CachePayload::Parsed(parsed)) = self.memory_get(&key) {
            self.record(CacheOperation::ParsedFile, true);
            return Some(parsed);
        }
        let raw = self
            .with_durable("parsed-file read", |s| s.load_parsed(path, content_hash))
            .flatten();
        let found = raw.and_then(|raw| {
            let parsed: ParsedFile = self.decode("parsed file", &raw)?;
            let parsed = Arc::new(parsed);
            self.memory_put(key, CachePayload::Parsed(parsed.clone()), raw.len());
            Some(parsed)
        });
        self.record(CacheOperation::ParsedFile, found.is_some());
        found
    }

    pub fn save_parsed_file(&self, path: &str, content_hash: &str, parsed: Arc<ParsedFile>) {
        let Some(raw) = Self::encode("parsed file", parsed.as_ref()) else {
            return;
        };
        let now = now_ms();
        self.with_durable("parsed-file write", |s| {
            s.save_parsed(
                path,
                content_hash,
                &raw,
                &parsed.language,
                parsed.parse_duration_ms,
                now,
            )
        });
        let key = CacheKey::Parsed {
            path: path.to_string(),
            hash: content_hash.to_string(),
        };
        self.memory_put(key, CachePayload::Parsed(parsed), raw.len());
    }

    // ── Code maps ────────────────────────────────────────────────────────────

    pub fn get_code_map(&self, workspace: &str, state_hash: &str) -> Option<Arc<CachedCodeMap>> {
        let key = CacheKey::CodeMap {
            workspace: workspace.to_string(),
            state_hash: state_hash.to_string(),
        };
        if let Some(CachePayload::CodeMap(map)) = self.memory_get(&key) {
            self.record(CacheOperation::CodeMap, true);
            return Some(map);
        }
        let raw = self
            .with_durable("code-map read", |s| s.load_code_map(workspace, state_hash))
            .flatten();
        let found = raw.and_then(|raw| {
            let map: CachedCodeMap = self.decode("code map", &raw)?;
            let map = Arc::new(map);
            self.memory_put(key, CachePayload::CodeMap(map.clone()), raw.len());
            Some(map)
        });
        self.record(CacheOperation::CodeMap, found.is_some());
        found
    }

    pub fn save_code_map(&self, workspace: &str, state_hash: &str, map: Arc<CachedCodeMap>) {
        let Some(raw) = Self::encode("code map", map.as_ref()) else {
            return;
        };
        let now = now_ms();
        self.with_durable("code-map write", |s| {
            s.save_code_map(
                workspace,
                state_hash,
                &raw,
                map.file_count,
                map.symbol_count,
                now,
            )
        });
        let key = CacheKey::CodeMap {
            workspace: workspace.to_string(),
            state_hash: state_hash.to_string(),
        };
        self.memory_put(key, CachePayload::CodeMap(map), raw.len());
    }

    // ── Invalidation ─────────────────────────────────────────────────────────

    /// Drop every parsed-file entry for `path`, whatever its hash.
    pub fn invalidate_file(&self, path: &str) -> usize {
        let removed = lock(&self.memory)
            .remove_where(|key| matches!(key, CacheKey::Parsed { path: p, .. } if p == path));
        let durable = self
            .with_durable("file invalidation", |s| s.delete_parsed_path(path))
            .unwrap_or(0);
        log::debug!("Invalidated {path}: {removed} memory, {durable} durable entries");
        removed.max(durable)
    }

    /// Drop trees and code maps scoped to `workspace`.
    pub fn invalidate_workspace(&self, workspace: &str) -> usize {
        let removed = lock(&self.memory).remove_where(|key| key.workspace() == Some(workspace));
        let durable = self
            .with_durable("workspace invalidation", |s| s.delete_workspace(workspace))
            .unwrap_or(0);
        log::info!("Invalidated workspace {workspace}: {removed} memory, {durable} durable entries");
        removed.max(durable)
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    pub fn stats(&self) -> CacheStats {
        let memory = lock(&self.memory).stats();
        let metrics = lock(&self.metrics);
        CacheStats {
            operations: metrics.snapshot(),
            total: metrics.total(),
            memory_entries: memory.entries,
            memory_bytes: memory.bytes,
            memory_ceiling: memory.ceiling,
            evictions: memory.evictions,
            durable: self.durable.is_some(),
            durable_errors: self.durable_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset_metrics(&self) {
        lock(&self.metrics).reset();
        self.with_durable("metrics reset", DurableStore::reset_metrics);
    }

    /// Delete access patterns last used more than `max_age` ago.
    pub fn prune_history(&self, max_age: Duration) -> usize {
        let cutoff = now_ms().saturating_sub(u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX));
        self.with_durable("history prune", |s| s.prune_access_patterns(cutoff))
            .unwrap_or(0)
    }

    pub fn clear_all(&self) {
        lock(&self.memory).clear();
        lock(&self.metrics).reset();
        self.with_durable("clear", DurableStore::clear_all);
    }

    // ── Learning persistence ─────────────────────────────────────────────────

    pub fn record_access_pattern(&self, task: &str, files: &[String]) {
        let Some(files_json) = Self::encode("access pattern", &files) else {
            return;
        };
        let now = now_ms();
        self.with_durable("access-pattern write", |s| {
            s.record_access_pattern(&files_json, task, now)
        });
    }

    pub fn access_patterns(&self, limit: usize) -> Vec<AccessPattern> {
        self.with_durable("access-pattern read", |s| s.load_access_patterns(limit))
            .unwrap_or_default()
    }

    pub fn record_cooccurrence(&self, pairs: &[(String, String)]) {
        let now = now_ms();
        self.with_durable("co-occurrence write", |s| s.increment_cooccurrence(pairs, now));
    }

    pub fn cooccurrence(&self) -> Vec<CoOccurrence> {
        self.with_durable("co-occurrence read", DurableStore::load_cooccurrence)
            .unwrap_or_default()
    }
}
