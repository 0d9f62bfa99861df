use serde::{Deserialize, Serialize};

/// Rendered code map for one workspace state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCodeMap {
    pub content: String,
    pub file_count: usize,
    pub symbol_count: usize,
    #[serde(default)]
    pub tokens: usize,
    #[serde(default)]
    pub truncated: bool,
}

/// Files used to satisfy a past task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPattern {
    pub files: Vec<String>,
    pub task: String,
    pub frequency: u32,
    pub first_seen_ms: u64,
    pub last_access_ms: u64,
}

/// Times two files were selected together; `file_a < file_b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrence {
    pub file_a: String,
    pub file_b: String,
    pub count: u64,
    pub updated_ms: u64,
}
