use context_protocol::CacheCounters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical cache operations with their own hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    MerkleTree,
    ParsedFile,
    CodeMap,
}

impl CacheOperation {
    pub const ALL: [CacheOperation; 3] = [Self::MerkleTree, Self::ParsedFile, Self::CodeMap];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MerkleTree => "merkle_tree",
            Self::ParsedFile => "parsed_file",
            Self::CodeMap => "code_map",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == raw)
    }
}

/// Monotonic counters, zeroed only by an explicit reset.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    counters: BTreeMap<CacheOperation, CacheCounters>,
}

impl CacheMetrics {
    pub fn record(&mut self, op: CacheOperation, hit: bool) {
        let entry = self.counters.entry(op).or_default();
        if hit {
            entry.hits += 1;
        } else {
            entry.misses += 1;
        }
    }

    /// Seed counters loaded from durable storage.
    pub fn seed(&mut self, op: CacheOperation, counters: CacheCounters) {
        self.counters.insert(op, counters);
    }

    pub fn get(&self, op: CacheOperation) -> CacheCounters {
        self.counters.get(&op).copied().unwrap_or_default()
    }

    pub fn total(&self) -> CacheCounters {
        self.counters
            .values()
            .fold(CacheCounters::default(), |acc, c| CacheCounters {
                hits: acc.hits + c.hits,
                misses: acc.misses + c.misses,
            })
    }

    pub fn snapshot(&self) -> BTreeMap<String, CacheCounters> {
        CacheOperation::ALL
            .into_iter()
            .map(|op| (op.as_str().to_string(), self.get(op)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

/// Point-in-time view of both tiers and the operation counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub operations: BTreeMap<String, CacheCounters>,
    pub total: CacheCounters,
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub memory_ceiling: usize,
    pub evictions: u64,
    pub durable: bool,
    /// Durable-tier failures absorbed since startup.
    pub durable_errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.total.hits + self.total.misses;
        if lookups == 0 {
            0.0
        } else {
            self.total.hits as f64 / lookups as f64
        }
    }
}
