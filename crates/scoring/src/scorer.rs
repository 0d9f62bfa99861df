use crate::error::Result;
use crate::keywords::{path_tokens, tokenize};
use crate::rules::{CompiledRules, SelectionRules};
use crate::working_set::WorkingSet;
use context_symbols::{FileCategory, Language, ParsedFile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const ENTRY_POINT_STEMS: &[&str] = &["index", "main", "app", "server", "cli"];
const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs"];
const MAX_EXPORTED_COUNTED: usize = 8;
const MS_PER_HOUR: f64 = 3_600_000.0;

/// What the scorer knows about one candidate.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    pub path: String,
    pub modified_ms: Option<u64>,
    pub parsed: Option<Arc<ParsedFile>>,
}

impl FileFacts {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn modified_at(mut self, modified_ms: u64) -> Self {
        self.modified_ms = Some(modified_ms);
        self
    }

    #[must_use]
    pub fn with_parsed(mut self, parsed: Arc<ParsedFile>) -> Self {
        self.parsed = Some(parsed);
        self
    }
}

/// Per-signal contributions; `total` is their clamped sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub working_set: f64,
    pub recency: f64,
    pub entry_point: f64,
    pub tests_present: f64,
    pub file_type: f64,
    pub symbols: f64,
    pub task_keyword: f64,
    pub rules: f64,
    /// Added afterwards by the learning pass.
    pub learned: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    fn finish(mut self) -> Self {
        let sum = self.working_set
            + self.recency
            + self.entry_point
            + self.tests_present
            + self.file_type
            + self.symbols
            + self.task_keyword
            + self.rules
            + self.learned;
        self.total = sum.max(0.0);
        self
    }

    pub(crate) fn add_learned(&mut self, boost: f64) {
        self.learned += boost;
        *self = self.finish();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFile {
    pub path: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

impl ScoredFile {
    pub(crate) fn add_learned(&mut self, boost: f64) {
        self.breakdown.add_learned(boost);
        self.score = self.breakdown.total;
    }
}

/// Subjects of the test files in a candidate set, by file stem.
#[derive(Debug, Clone, Default)]
pub struct TestIndex {
    subjects: HashSet<String>,
}

impl TestIndex {
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let subjects = paths
            .into_iter()
            .filter(|p| is_test_file(p))
            .filter_map(test_subject)
            .collect();
        Self { subjects }
    }

    /// Whether some test file exercises `path`.
    pub fn has_test_for(&self, path: &str) -> bool {
        !is_test_file(path) && self.subjects.contains(&file_stem(path))
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Name up to the first dot, lowercased: `userService.test.ts` → `userservice`.
fn file_stem(path: &str) -> String {
    let name = file_name(path);
    name.split('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(name)
        .to_lowercase()
}

pub fn is_test_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = file_name(&lower);
    let mut parts = name.split('.');
    let stem = parts.next().unwrap_or_default();
    if parts.any(|part| part == "test" || part == "spec") {
        return true;
    }
    if stem.starts_with("test_") || stem.ends_with("_test") || stem.ends_with("_spec") {
        return true;
    }
    lower
        .split('/')
        .rev()
        .skip(1)
        .any(|dir| TEST_DIRS.contains(&dir))
}

fn test_subject(path: &str) -> Option<String> {
    let stem = file_stem(path);
    let subject = stem
        .strip_prefix("test_")
        .or_else(|| stem.strip_suffix("_test"))
        .or_else(|| stem.strip_suffix("_spec"))
        .unwrap_or(&stem);
    (!subject.is_empty()).then(|| subject.to_string())
}

pub fn is_entry_point(path: &str) -> bool {
    ENTRY_POINT_STEMS.contains(&file_stem(path).as_str())
}

/// Per-request inputs shared by every candidate.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub working_set: WorkingSet,
    pub keywords: BTreeSet<String>,
    pub tests: TestIndex,
}

impl ScoringContext {
    pub fn new(task: &str, working_set: WorkingSet, tests: TestIndex) -> Self {
        Self {
            working_set,
            keywords: tokenize(task),
            tests,
        }
    }
}

/// Additive multi-signal relevance scorer.
#[derive(Debug, Clone)]
pub struct ContextScorer {
    rules: SelectionRules,
    compiled: CompiledRules,
    decay_per_hour: f64,
    now_ms: u64,
}

impl ContextScorer {
    pub fn new(rules: SelectionRules, decay_per_hour: f64) -> Result<Self> {
        rules.validate()?;
        let compiled = rules.compile()?;
        Ok(Self {
            rules,
            compiled,
            decay_per_hour: decay_per_hour.max(0.0),
            now_ms: crate::now_ms(),
        })
    }

    /// Pin the clock used for recency.
    #[must_use]
    pub fn at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    pub fn rules(&self) -> &SelectionRules {
        &self.rules
    }

    pub fn compiled_rules(&self) -> &CompiledRules {
        &self.compiled
    }

    pub fn score_file(&self, facts: &FileFacts, ctx: &ScoringContext) -> f64 {
        self.breakdown(facts, ctx).total
    }

    pub fn breakdown(&self, facts: &FileFacts, ctx: &ScoringContext) -> ScoreBreakdown {
        let weights = &self.rules.weights;
        let path = facts.path.as_str();
        let parsed = facts.parsed.as_deref();

        let mut out = ScoreBreakdown::default();

        if ctx.working_set.contains_file(path) {
            out.working_set += 2.0 * weights.working_set;
        }
        if let Some(parsed) = parsed {
            if parsed
                .symbols
                .iter()
                .any(|s| ctx.working_set.symbols.contains(&s.name))
            {
                out.working_set += weights.working_set;
            }
        }

        if let Some(modified) = facts.modified_ms {
            let hours = self.now_ms.saturating_sub(modified) as f64 / MS_PER_HOUR;
            out.recency = weights.recency * (-self.decay_per_hour * hours).exp();
        }

        if is_entry_point(path) {
            out.entry_point = weights.entry_point;
        }
        if ctx.tests.has_test_for(path) {
            out.tests_present = weights.tests_present;
        }

        out.file_type = self.file_type_score(path);
        if let Some(parsed) = parsed {
            out.symbols = self.symbol_score(parsed);
        }
        out.task_keyword = weights.task_keyword * keyword_hits(&ctx.keywords, path, parsed) as f64;

        if self.compiled.is_included(path) {
            out.rules += self.rules.include_bonus;
        }
        if self.compiled.is_excluded(path) {
            out.rules -= self.rules.exclude_penalty;
        }

        out.finish()
    }

    /// Score every candidate, highest first; ties by path.
    pub fn rank(&self, files: &[FileFacts], ctx: &ScoringContext) -> Vec<ScoredFile> {
        let mut scored: Vec<ScoredFile> = files
            .iter()
            .map(|facts| {
                let breakdown = self.breakdown(facts, ctx);
                ScoredFile {
                    path: facts.path.clone(),
                    score: breakdown.total,
                    breakdown,
                }
            })
            .collect();
        sort_scored(&mut scored);
        scored
    }

    fn file_type_score(&self, path: &str) -> f64 {
        let types = &self.rules.file_types;
        let base = match Language::from_path(path).category() {
            FileCategory::Config => types.config,
            FileCategory::Source => types.source,
            FileCategory::Style => types.style,
            FileCategory::Docs => types.docs,
            FileCategory::Other => types.other,
        };
        if is_test_file(path) {
            base - types.test_penalty
        } else {
            base
        }
    }

    fn symbol_score(&self, parsed: &ParsedFile) -> f64 {
        let weights = &self.rules.weights;
        if parsed.symbols.is_empty() {
            return 0.0;
        }
        let exported = parsed.exported_symbols().count().min(MAX_EXPORTED_COUNTED);
        let documented = parsed.symbols.iter().filter(|s| s.documented).count();
        let documented_ratio = documented as f64 / parsed.symbols.len() as f64;

        weights.exported * exported as f64
            + weights.complexity * f64::from(parsed.max_complexity()).ln_1p()
            + weights.references * f64::from(parsed.total_references()).ln_1p()
            + weights.documented * documented_ratio
    }
}

pub(crate) fn sort_scored(scored: &mut [ScoredFile]) {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Task keywords found in the path or in a declared symbol name.
fn keyword_hits(keywords: &BTreeSet<String>, path: &str, parsed: Option<&ParsedFile>) -> usize {
    if keywords.is_empty() {
        return 0;
    }
    let mut vocabulary = path_tokens(path);
    if let Some(parsed) = parsed {
        for symbol in &parsed.symbols {
            vocabulary.extend(tokenize(&symbol.name));
            if symbol.name.len() > 1 {
                vocabulary.insert(symbol.name.to_lowercase());
            }
        }
    }
    keywords.iter().filter(|k| vocabulary.contains(*k)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scorer() -> ContextScorer {
        ContextScorer::new(SelectionRules::default(), 0.1)
            .unwrap()
            .at(10 * 3_600_000)
    }

    #[test]
    fn recognizes_test_files_and_subjects() {
        assert!(is_test_file("src/user.test.ts"));
        assert!(is_test_file("tests/parser.rs"));
        assert!(is_test_file("pkg/test_models.py"));
        assert!(!is_test_file("src/testing_utils.ts"));

        let index = TestIndex::from_paths(["src/user.test.ts", "pkg/test_models.py", "src/user.ts"]);
        assert!(index.has_test_for("src/user.ts"));
        assert!(index.has_test_for("pkg/models.py"));
        assert!(!index.has_test_for("src/user.test.ts"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn recency_decays_exponentially() {
        let scorer = scorer();
        let ctx = ScoringContext::default();
        let fresh = scorer.breakdown(&FileFacts::new("a.md").modified_at(10 * 3_600_000), &ctx);
        let old = scorer.breakdown(&FileFacts::new("a.md").modified_at(0), &ctx);
        assert!((fresh.recency - 2.0).abs() < 1e-9);
        assert!((old.recency - 2.0 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn file_types_rank_config_over_docs_and_penalize_tests() {
        let scorer = scorer();
        let ctx = ScoringContext::default();
        let score = |p: &str| scorer.score_file(&FileFacts::new(p), &ctx);
        assert!(score("config.json") > score("src/lib.rs"));
        assert!(score("src/lib.rs") > score("style.css"));
        assert!(score("style.css") > score("README.md"));
        assert!(score("src/lib.rs") > score("src/lib.test.ts"));
    }

    #[test]
    fn working_set_files_weigh_double() {
        let scorer = scorer();
        let mut ctx = ScoringContext::default();
        ctx.working_set.open("src/open.ts");
        let breakdown = scorer.breakdown(&FileFacts::new("src/open.ts"), &ctx);
        assert_eq!(breakdown.working_set, 4.0);
    }

    #[test]
    fn exclude_penalty_never_goes_negative() {
        let rules = SelectionRules {
            exclude: vec!["**/*.md".to_string()],
            ..SelectionRules::default()
        };
        let scorer = ContextScorer::new(rules, 0.1).unwrap();
        let total = scorer.score_file(&FileFacts::new("docs/a.md"), &ScoringContext::default());
        assert_eq!(total, 0.0);
    }

    #[test]
    fn entry_points_and_keywords() {
        let scorer = scorer();
        let ctx = ScoringContext::new("tune the server cache", WorkingSet::default(), TestIndex::default());
        let server = scorer.breakdown(&FileFacts::new("src/server.ts"), &ctx);
        assert_eq!(server.entry_point, 1.5);
        assert_eq!(server.task_keyword, 3.0);
        let cache = scorer.breakdown(&FileFacts::new("src/cache/store.ts"), &ctx);
        assert_eq!(cache.entry_point, 0.0);
        assert_eq!(cache.task_keyword, 3.0);
    }
}
