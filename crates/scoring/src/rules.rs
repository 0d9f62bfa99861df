use crate::error::{Result, ScoringError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Named weights for the additive relevance signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Per working-set hit; whole-file membership counts double.
    pub working_set: f64,
    /// Ceiling of the recency signal for a file modified just now.
    pub recency: f64,
    pub exported: f64,
    pub complexity: f64,
    pub references: f64,
    pub tests_present: f64,
    pub documented: f64,
    pub entry_point: f64,
    /// Per task keyword found in the path or an exported symbol name.
    pub task_keyword: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            working_set: 2.0,
            recency: 2.0,
            exported: 0.5,
            complexity: 0.3,
            references: 0.3,
            tests_present: 0.5,
            documented: 0.5,
            entry_point: 1.5,
            task_keyword: 3.0,
        }
    }
}

/// Base score per file role. Tests are penalized on top of their role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTypeScores {
    pub config: f64,
    pub source: f64,
    pub style: f64,
    pub docs: f64,
    pub other: f64,
    pub test_penalty: f64,
}

impl Default for FileTypeScores {
    fn default() -> Self {
        Self {
            config: 1.2,
            source: 1.0,
            style: 0.6,
            docs: 0.4,
            other: 0.1,
            test_penalty: 0.5,
        }
    }
}

/// Scoring configuration: weights plus include/exclude path patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRules {
    pub weights: ScoreWeights,
    pub file_types: FileTypeScores,
    /// Globs whose matches earn `include_bonus`.
    pub include: Vec<String>,
    /// Globs whose matches lose `exclude_penalty` and are dropped from implicit candidates.
    pub exclude: Vec<String>,
    pub include_bonus: f64,
    pub exclude_penalty: f64,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            file_types: FileTypeScores::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            include_bonus: 2.0,
            exclude_penalty: 5.0,
        }
    }
}

impl SelectionRules {
    pub fn compile(&self) -> Result<CompiledRules> {
        Ok(CompiledRules {
            include: build_globset(&self.include)?,
            exclude: build_globset(&self.exclude)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let values = [
            ("working_set", w.working_set),
            ("recency", w.recency),
            ("exported", w.exported),
            ("complexity", w.complexity),
            ("references", w.references),
            ("tests_present", w.tests_present),
            ("documented", w.documented),
            ("entry_point", w.entry_point),
            ("task_keyword", w.task_keyword),
            ("include_bonus", self.include_bonus),
            ("exclude_penalty", self.exclude_penalty),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringError::InvalidConfig(format!(
                    "weight {name} must be a non-negative number, got {value}"
                )));
            }
        }
        self.compile().map(|_| ())
    }
}

/// Include/exclude patterns ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    include: GlobSet,
    exclude: GlobSet,
}

impl CompiledRules {
    pub fn is_included(&self, path: &str) -> bool {
        self.include.is_match(path)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude.is_match(path)
    }
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScoringError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScoringError::InvalidPattern {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}
