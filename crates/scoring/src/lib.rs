//! Candidate resolution, relevance ranking and token budgeting.

mod budget;
mod error;
mod keywords;
mod learning;
mod rules;
mod scorer;
mod selector;
mod tokens;
mod working_set;

pub use budget::{
    get_token_budget, optimize_for_limit, BudgetCandidate, BudgetSelection, BudgetShares,
};
pub use error::{Result, ScoringError};
pub use keywords::{jaccard, path_tokens, tokenize};
pub use learning::{canonical_pairs, LearningBoosts, LearningConfig, LearningStore};
pub use rules::{CompiledRules, FileTypeScores, ScoreWeights, SelectionRules};
pub use scorer::{
    is_entry_point, is_test_file, ContextScorer, FileFacts, ScoreBreakdown, ScoredFile,
    ScoringContext, TestIndex,
};
pub use selector::{
    validate_patterns, FileSelector, Selection, SelectorConfig, CONTEXT_IGNORE_FILE,
    DEFAULT_MAX_FILE_SIZE,
};
pub use tokens::{chars_per_token, estimate_file_tokens, estimate_tokens, DEFAULT_CHARS_PER_TOKEN};
pub use working_set::WorkingSet;

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
