use crate::error::{Result, ScoringError};
use context_protocol::TokenBudget;
use serde::{Deserialize, Serialize};

const SHARE_EPSILON: f64 = 1e-6;

/// Fractions of the ceiling given to each output section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetShares {
    pub file_map: f64,
    pub code_map: f64,
    pub content: f64,
}

impl Default for BudgetShares {
    fn default() -> Self {
        Self {
            file_map: 0.10,
            code_map: 0.30,
            content: 0.60,
        }
    }
}

impl BudgetShares {
    pub fn validate(&self) -> Result<()> {
        let shares = [self.file_map, self.code_map, self.content];
        if shares.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(ScoringError::InvalidConfig(
                "budget shares must be non-negative".to_string(),
            ));
        }
        let sum: f64 = shares.iter().sum();
        if (sum - 1.0).abs() > SHARE_EPSILON {
            return Err(ScoringError::InvalidConfig(format!(
                "budget shares must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// Partition `total`; content takes whatever rounding leaves over.
    pub fn split(&self, total: usize) -> TokenBudget {
        let file_map = (total as f64 * self.file_map).floor() as usize;
        let code_map = (total as f64 * self.code_map).floor() as usize;
        let content = total.saturating_sub(file_map + code_map);
        TokenBudget {
            total,
            file_map,
            code_map,
            content,
        }
    }
}

/// 10% file map, 30% code map, 60% content.
pub fn get_token_budget(total: usize) -> TokenBudget {
    BudgetShares::default().split(total)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCandidate {
    pub path: String,
    pub tokens: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetSelection {
    /// Chosen files, in ranking order.
    pub selected: Vec<BudgetCandidate>,
    pub used_tokens: usize,
    /// The lone selected file alone exceeds the limit.
    pub over_budget: bool,
    /// Candidates that did not fit.
    pub dropped: usize,
}

impl BudgetSelection {
    pub fn paths(&self) -> Vec<String> {
        self.selected.iter().map(|c| c.path.clone()).collect()
    }
}

/// Greedy selection by descending score, cheaper first on ties.
///
/// Files that do not fit are skipped and the scan continues, so a large file
/// never blocks smaller ones ranked below it. A non-empty input always yields
/// at least one file, even when the best one alone exceeds `limit`.
pub fn optimize_for_limit(mut candidates: Vec<BudgetCandidate>, limit: usize) -> BudgetSelection {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.tokens.cmp(&b.tokens))
            .then_with(|| a.path.cmp(&b.path))
    });

    let total = candidates.len();
    let mut out = BudgetSelection::default();
    let mut rest = Vec::new();
    for candidate in candidates {
        if out.used_tokens + candidate.tokens <= limit {
            out.used_tokens += candidate.tokens;
            out.selected.push(candidate);
        } else {
            rest.push(candidate);
        }
    }

    if out.selected.is_empty() {
        if let Some(first) = rest.into_iter().next() {
            log::debug!(
                "No candidate fits {limit} tokens; keeping {} ({} tokens)",
                first.path,
                first.tokens
            );
            out.used_tokens = first.tokens;
            out.over_budget = first.tokens > limit;
            out.selected.push(first);
        }
    }
    out.dropped = total - out.selected.len();
    out
}
