//! Feedback from past selections: similar tasks and files picked together.
//!
//! History is mirrored in memory so boosts work on a memory-only cache; the
//! durable tier, when present, carries it across sessions.

use crate::keywords::{jaccard, tokenize};
use crate::scorer::{sort_scored, ScoredFile};
use context_cache::{AccessPattern, CacheManager};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Recency decay per hour since last modification.
    pub decay_per_hour: f64,
    pub top_patterns: usize,
    pub min_similarity: f64,
    pub pattern_boost_cap: f64,
    pub cooccurrence_boost_per_count: f64,
    pub cooccurrence_boost_cap: f64,
    /// Files scoring at least this much propagate co-occurrence boosts.
    pub high_relevance_cutoff: f64,
    pub retention_days: u64,
    pub max_task_chars: usize,
    pub max_recorded_files: usize,
    /// Access patterns loaded from the durable tier at startup.
    pub history_limit: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            decay_per_hour: 0.1,
            top_patterns: 5,
            min_similarity: 0.2,
            pattern_boost_cap: 3.0,
            cooccurrence_boost_per_count: 0.25,
            cooccurrence_boost_cap: 2.0,
            high_relevance_cutoff: 5.0,
            retention_days: 30,
            max_task_chars: 500,
            max_recorded_files: 50,
            history_limit: 1_000,
        }
    }
}

impl LearningConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 3600))
    }
}

#[derive(Debug, Clone)]
struct KnownPattern {
    pattern: AccessPattern,
    keywords: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct LearningState {
    patterns: Vec<KnownPattern>,
    /// Symmetric adjacency: file → (partner → count).
    cooccurrence: HashMap<String, BTreeMap<String, u64>>,
}

impl LearningState {
    fn bump_pair(&mut self, a: &str, b: &str, by: u64) {
        *self
            .cooccurrence
            .entry(a.to_string())
            .or_default()
            .entry(b.to_string())
            .or_insert(0) += by;
        *self
            .cooccurrence
            .entry(b.to_string())
            .or_default()
            .entry(a.to_string())
            .or_insert(0) += by;
    }
}

/// Boosts applied to one ranking, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningBoosts {
    pub pattern: BTreeMap<String, f64>,
    pub cooccurrence: BTreeMap<String, f64>,
    /// Similar past tasks that contributed.
    pub patterns_used: usize,
}

#[derive(Debug)]
pub struct LearningStore {
    cache: Arc<CacheManager>,
    config: LearningConfig,
    state: Mutex<LearningState>,
}

fn lock(state: &Mutex<LearningState>) -> MutexGuard<'_, LearningState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Every unordered pair of `files`, each as `(smaller, larger)`.
pub fn canonical_pairs(files: &[String]) -> Vec<(String, String)> {
    let unique: BTreeSet<&String> = files.iter().collect();
    let unique: Vec<&String> = unique.into_iter().collect();
    let mut pairs = Vec::with_capacity(unique.len() * unique.len().saturating_sub(1) / 2);
    for (i, a) in unique.iter().enumerate() {
        for b in &unique[i + 1..] {
            pairs.push(((*a).clone(), (*b).clone()));
        }
    }
    pairs
}

impl LearningStore {
    /// Load history persisted in `cache`.
    pub fn load(cache: Arc<CacheManager>, config: LearningConfig) -> Self {
        let mut state = LearningState::default();
        for pattern in cache.access_patterns(config.history_limit) {
            let keywords = tokenize(&pattern.task);
            state.patterns.push(KnownPattern { pattern, keywords });
        }
        for row in cache.cooccurrence() {
            state.bump_pair(&row.file_a, &row.file_b, row.count);
        }
        log::debug!(
            "Loaded learning history: {} access patterns, {} co-selected files",
            state.patterns.len(),
            state.cooccurrence.len()
        );
        Self {
            cache,
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn pattern_count(&self) -> usize {
        lock(&self.state).patterns.len()
    }

    pub fn cooccurrence_count(&self, a: &str, b: &str) -> u64 {
        lock(&self.state)
            .cooccurrence
            .get(a)
            .and_then(|partners| partners.get(b))
            .copied()
            .unwrap_or(0)
    }

    /// Compute the boosts for `task` against the current ranking.
    pub fn boosts(&self, task: &str, scored: &[ScoredFile]) -> LearningBoosts {
        let keywords = tokenize(task);
        let state = lock(&self.state);
        let mut out = LearningBoosts::default();

        let mut similar: Vec<(f64, &KnownPattern)> = state
            .patterns
            .iter()
            .map(|known| (jaccard(&keywords, &known.keywords), known))
            .filter(|(sim, _)| *sim >= self.config.min_similarity)
            .collect();
        similar.sort_by(|a, b| b.0.total_cmp(&a.0));
        similar.truncate(self.config.top_patterns);
        out.patterns_used = similar.len();

        for (sim, known) in &similar {
            for file in &known.pattern.files {
                let boost = out.pattern.entry(file.clone()).or_insert(0.0);
                *boost += sim * f64::from(known.pattern.frequency);
            }
        }
        for boost in out.pattern.values_mut() {
            *boost = boost.min(self.config.pattern_boost_cap);
        }

        for file in scored {
            let current = file.score + out.pattern.get(&file.path).copied().unwrap_or(0.0);
            if current < self.config.high_relevance_cutoff {
                continue;
            }
            let Some(partners) = state.cooccurrence.get(&file.path) else {
                continue;
            };
            for (partner, count) in partners {
                let boost = out.cooccurrence.entry(partner.clone()).or_insert(0.0);
                *boost += self.config.cooccurrence_boost_per_count * *count as f64;
            }
        }
        for boost in out.cooccurrence.values_mut() {
            *boost = boost.min(self.config.cooccurrence_boost_cap);
        }
        out
    }

    /// Apply learned boosts to a ranking and re-sort it.
    pub fn apply(&self, task: &str, scored: &mut [ScoredFile]) -> LearningBoosts {
        let boosts = self.boosts(task, scored);
        for file in scored.iter_mut() {
            let boost = boosts.pattern.get(&file.path).copied().unwrap_or(0.0)
                + boosts.cooccurrence.get(&file.path).copied().unwrap_or(0.0);
            if boost > 0.0 {
                file.add_learned(boost);
            }
        }
        sort_scored(scored);
        boosts
    }

    /// Remember that `files` satisfied `task`.
    pub fn record_selection(&self, task: &str, files: &[String]) {
        if files.is_empty() {
            return;
        }
        let task = truncate_chars(task.trim(), self.config.max_task_chars);
        let files: Vec<String> = files
            .iter()
            .take(self.config.max_recorded_files)
            .cloned()
            .collect();
        let pairs = canonical_pairs(&files);

        self.cache.record_access_pattern(&task, &files);
        if !pairs.is_empty() {
            self.cache.record_cooccurrence(&pairs);
        }

        let now = crate::now_ms();
        let mut state = lock(&self.state);
        match state
            .patterns
            .iter_mut()
            .find(|known| known.pattern.task == task && known.pattern.files == files)
        {
            Some(known) => {
                known.pattern.frequency = known.pattern.frequency.saturating_add(1);
                known.pattern.last_access_ms = now;
            }
            None => {
                let keywords = tokenize(&task);
                state.patterns.push(KnownPattern {
                    pattern: AccessPattern {
                        files,
                        task,
                        frequency: 1,
                        first_seen_ms: now,
                        last_access_ms: now,
                    },
                    keywords,
                });
            }
        }
        for (a, b) in &pairs {
            state.bump_pair(a, b, 1);
        }
        log::debug!("Recorded selection: {} pairs", pairs.len());
    }

    /// Forget access patterns older than the retention window.
    pub fn prune(&self) -> usize {
        let retention = self.config.retention();
        let durable = self.cache.prune_history(retention);
        let cutoff = crate::now_ms()
            .saturating_sub(u64::try_from(retention.as_millis()).unwrap_or(u64::MAX));
        let mut state = lock(&self.state);
        let before = state.patterns.len();
        state
            .patterns
            .retain(|known| known.pattern.last_access_ms >= cutoff);
        let pruned = before - state.patterns.len();
        if pruned > 0 || durable > 0 {
            log::info!("Pruned {} access patterns ({durable} durable)", pruned);
        }
        pruned.max(durable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::ScoreBreakdown;
    use pretty_assertions::assert_eq;

    fn scored(path: &str, score: f64) -> ScoredFile {
        ScoredFile {
            path: path.to_string(),
            score,
            breakdown: ScoreBreakdown {
                file_type: score,
                total: score,
                ..ScoreBreakdown::default()
            },
        }
    }

    fn store() -> LearningStore {
        LearningStore::load(
            Arc::new(CacheManager::memory_only(1 << 20)),
            LearningConfig::default(),
        )
    }

    #[test]
    fn pairs_are_canonical_and_unique() {
        let files = vec!["b".to_string(), "a".to_string(), "c".to_string(), "a".to_string()];
        assert_eq!(
            canonical_pairs(&files),
            vec![
                ("a".to_string(), "b".to_string()),
                ("a".to_string(), "c".to_string()),
                ("b".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn similar_tasks_boost_their_files() {
        let store = store();
        store.record_selection("refactor payment gateway retry", &["src/pay.ts".to_string()]);
        store.record_selection("render landing page", &["src/page.tsx".to_string()]);

        let mut ranking = vec![scored("src/pay.ts", 1.0), scored("src/page.tsx", 1.0)];
        let boosts = store.apply("payment gateway retry timeout", &mut ranking);
        assert_eq!(boosts.patterns_used, 1);
        assert_eq!(ranking[0].path, "src/pay.ts");
        assert!(ranking[0].breakdown.learned > 0.0);
        assert_eq!(ranking[1].breakdown.learned, 0.0);
    }

    #[test]
    fn pattern_boost_is_capped() {
        let store = store();
        for _ in 0..20 {
            store.record_selection("payment gateway", &["src/pay.ts".to_string()]);
        }
        let boosts = store.boosts("payment gateway", &[]);
        assert_eq!(boosts.pattern.get("src/pay.ts").copied(), Some(3.0));
    }

    #[test]
    fn cooccurrence_flows_from_high_scorers_only() {
        let store = store();
        let files = vec!["src/a.ts".to_string(), "src/b.ts".to_string()];
        for _ in 0..3 {
            store.record_selection("unrelated words here", &files);
        }
        assert_eq!(store.cooccurrence_count("src/a.ts", "src/b.ts"), 3);

        let low = store.boosts("zzz", &[scored("src/a.ts", 1.0), scored("src/b.ts", 0.5)]);
        assert!(low.cooccurrence.is_empty());

        let high = store.boosts("zzz", &[scored("src/a.ts", 6.0), scored("src/b.ts", 0.5)]);
        assert_eq!(high.cooccurrence.get("src/b.ts").copied(), Some(0.75));
    }

    #[test]
    fn records_truncate_task_and_files() {
        let store = store();
        let files: Vec<String> = (0..80).map(|i| format!("f{i}.ts")).collect();
        store.record_selection(&"x".repeat(2_000), &files);
        let state = lock(&store.state);
        assert_eq!(state.patterns[0].pattern.task.len(), 500);
        assert_eq!(state.patterns[0].pattern.files.len(), 50);
    }
}
