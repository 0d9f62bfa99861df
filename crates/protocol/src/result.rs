use serde::{Deserialize, Serialize};

/// How a token ceiling is split across the three output sections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenBudget {
    pub total: usize,
    pub file_map: usize,
    pub code_map: usize,
    pub content: usize,
}

/// One file chosen for the context payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedFile {
    pub path: String,
    pub score: f64,
    pub tokens: usize,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
}

/// Diff of the workspace against the tree retained from the previous pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GenerationMetadata {
    pub total_tokens: usize,
    pub file_map_tokens: usize,
    pub code_map_tokens: usize,
    pub content_tokens: usize,
    /// Candidate files considered for selection.
    pub file_count: usize,
    pub selected_count: usize,
    pub symbol_count: usize,
    pub cache: CacheCounters,
    pub elapsed_ms: u64,
    pub budget: TokenBudget,
    pub changes: ChangeSummary,
    /// Some section was cut to fit its share of the budget.
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub root_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub file_map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_files: Option<Vec<SelectedFile>>,
    pub metadata: GenerationMetadata,
}

impl GenerationResult {
    /// Paths of the selected files, in ranking order.
    pub fn selected_paths(&self) -> Vec<&str> {
        self.selected_files
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|f| f.path.as_str())
            .collect()
    }
}
