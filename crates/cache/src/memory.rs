//! Byte-bounded in-memory tier.
//!
//! `lru` bounds by entry count, so the cache is unbounded there and the byte
//! ceiling is enforced here by popping least-recently-used entries.

use crate::types::CachedCodeMap;
use context_merkle::MerkleTree;
use context_symbols::ParsedFile;
use lru::LruCache;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Tree { workspace: String, revision: String },
    Parsed { path: String, hash: String },
    CodeMap { workspace: String, state_hash: String },
}

impl CacheKey {
    pub fn workspace(&self) -> Option<&str> {
        match self {
            Self::Tree { workspace, .. } | Self::CodeMap { workspace, .. } => Some(workspace),
            Self::Parsed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachePayload {
    Tree(Arc<MerkleTree>),
    Parsed(Arc<ParsedFile>),
    CodeMap(Arc<CachedCodeMap>),
}

#[derive(Debug)]
struct MemoryEntry {
    payload: CachePayload,
    size: usize,
    last_used_ms: u64,
    hits: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub entries: usize,
    pub bytes: usize,
    pub ceiling: usize,
    pub evictions: u64,
    pub hits: u64,
}

#[derive(Debug)]
pub struct MemoryTier {
    entries: LruCache<CacheKey, MemoryEntry>,
    ceiling: usize,
    used: usize,
    evictions: u64,
}

impl MemoryTier {
    pub fn new(ceiling_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            ceiling: ceiling_bytes,
            used: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, key: &CacheKey, now_ms: u64) -> Option<CachePayload> {
        let entry = self.entries.get_mut(key)?;
        entry.last_used_ms = now_ms;
        entry.hits += 1;
        Some(entry.payload.clone())
    }

    /// Insert, evicting least-recently-used entries until `size` fits.
    /// Entries larger than the whole ceiling are not kept.
    pub fn insert(&mut self, key: CacheKey, payload: CachePayload, size: usize, now_ms: u64) {
        self.remove(&key);
        if size > self.ceiling {
            log::debug!("Not caching {key:?} in memory: {size} bytes exceeds ceiling");
            return;
        }
        while self.used + size > self.ceiling {
            let Some((victim, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.used -= entry.size;
            self.evictions += 1;
            log::trace!("Evicted {victim:?} ({} bytes)", entry.size);
        }
        self.used += size;
        self.entries.push(
            key,
            MemoryEntry {
                payload,
                size,
                last_used_ms: now_ms,
                hits: 0,
            },
        );
    }

    pub fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.used -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn remove_where(&mut self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        doomed.iter().filter(|key| self.remove(key)).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Milliseconds timestamp of the last read or write of `key`.
    pub fn last_used(&self, key: &CacheKey) -> Option<u64> {
        self.entries.peek(key).map(|e| e.last_used_ms)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.entries.len(),
            bytes: self.used,
            ceiling: self.ceiling,
            evictions: self.evictions,
            hits: self.entries.iter().map(|(_, e)| e.hits).sum(),
        }
    }
}
