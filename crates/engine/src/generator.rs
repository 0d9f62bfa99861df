use crate::code_map::render_code_map;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::file_map::{render_file_map, FileMapEntry};
use crate::section::RenderedSection;
use context_cache::{CacheManager, CachedCodeMap};
use context_merkle::{
    batch, diff, diff_from_empty, hash_bytes, probe_revision, probe_vcs, workspace_id,
    MerkleTree, TreeBuilder, TreeDiff,
};
use context_protocol::{
    normalize_rel_path, CacheCounters, ChangeSummary, GenerateOptions, GenerationMetadata,
    GenerationResult, SelectedFile, Trigger,
};
use context_scoring::{
    estimate_tokens, optimize_for_limit, BudgetCandidate, ContextScorer, FileFacts, FileSelector,
    LearningStore, ScoringContext, TestIndex, WorkingSet,
};
use context_symbols::{Language, ParsedFile, SymbolParser};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as TokioMutex;

/// Per-session state carried between generation passes.
#[derive(Debug, Default)]
struct Session {
    previous: Option<Arc<MerkleTree>>,
    open_files: BTreeSet<String>,
}

struct Analyzed {
    path: String,
    tokens: usize,
    parsed: Arc<ParsedFile>,
}

/// Runs the whole pipeline for one workspace and keeps the state that makes
/// the next run cheaper: the last tree, the caches and the learning history.
pub struct ContextGenerator {
    root: PathBuf,
    workspace_id: String,
    config: EngineConfig,
    builder: TreeBuilder,
    parser: SymbolParser,
    scorer: ContextScorer,
    cache: Arc<CacheManager>,
    learning: LearningStore,
    concurrency: usize,
    session: TokioMutex<Session>,
}

impl std::fmt::Debug for ContextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGenerator")
            .field("root", &self.root)
            .field("workspace_id", &self.workspace_id)
            .finish_non_exhaustive()
    }
}

impl ContextGenerator {
    /// Open `workspace` with its caches as configured.
    pub fn open(workspace: &Path, config: EngineConfig) -> Result<Self> {
        let root = canonical_root(workspace)?;
        let cache = Arc::new(CacheManager::new(&config.cache_config(&root)));
        Self::with_cache(&root, config, cache)
    }

    /// Open `workspace` over an existing cache handle.
    pub fn with_cache(workspace: &Path, config: EngineConfig, cache: Arc<CacheManager>) -> Result<Self> {
        config.validate()?;
        let root = canonical_root(workspace)?;
        let concurrency = config
            .concurrency
            .unwrap_or_else(batch::concurrency_limit)
            .max(1);
        let builder = TreeBuilder::new(config.merkle.clone())?.with_concurrency(concurrency);
        let scorer = ContextScorer::new(
            config.scoring.rules.clone(),
            config.scoring.learning.decay_per_hour,
        )?;
        let learning = LearningStore::load(cache.clone(), config.scoring.learning.clone());
        Ok(Self {
            workspace_id: workspace_id(&root),
            root,
            config,
            builder,
            parser: SymbolParser::default(),
            scorer,
            cache,
            learning,
            concurrency,
            session: TokioMutex::new(Session::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn learning(&self) -> &LearningStore {
        &self.learning
    }

    /// Tree retained from the last pass, if any.
    pub async fn previous_tree(&self) -> Option<Arc<MerkleTree>> {
        self.session.lock().await.previous.clone()
    }

    pub async fn open_files(&self) -> BTreeSet<String> {
        self.session.lock().await.open_files.clone()
    }

    /// Build the current tree tagged with `revision`.
    pub async fn build_tree(&self, revision: Option<String>) -> Result<Arc<MerkleTree>> {
        Ok(Arc::new(
            self.builder.build_with_revision(&self.root, revision).await?,
        ))
    }

    /// Build the current tree and diff it against the one cached for the
    /// current revision; the new tree replaces the cached one.
    pub async fn diff_against_cached(&self) -> Result<(TreeDiff, Arc<MerkleTree>)> {
        let revision = probe_revision(&self.root).await;
        let previous = self.cache.get_tree(&self.workspace_id, revision.as_deref());
        let tree = self.build_tree(revision).await?;
        let changes = match &previous {
            Some(previous) => diff(previous, &tree),
            None => diff_from_empty(&tree),
        };
        self.cache.save_tree(tree.clone());
        Ok((changes, tree))
    }

    /// Build the current tree and diff it against the session baseline, or
    /// the cached tree when the session has none. The baseline moves only
    /// once the build succeeds.
    async fn advance_baseline(
        &self,
        revision: Option<String>,
    ) -> Result<(Arc<MerkleTree>, TreeDiff, BTreeSet<String>)> {
        let mut session = self.session.lock().await;
        let previous = match session.previous.clone() {
            Some(previous) => Some(previous),
            None => self.cache.get_tree(&self.workspace_id, revision.as_deref()),
        };
        let tree = self.build_tree(revision).await?;
        let changes = match &previous {
            Some(previous) => diff(previous, &tree),
            None => diff_from_empty(&tree),
        };
        self.cache.save_tree(tree.clone());
        session.previous = Some(tree.clone());
        Ok((tree, changes, session.open_files.clone()))
    }

    /// Drop cached parse results for `paths`.
    pub fn invalidate_paths(&self, paths: &[String]) -> usize {
        paths
            .iter()
            .map(|path| self.cache.invalidate_file(&normalize_rel_path(path)))
            .sum()
    }

    /// Apply the invalidation or working-set change a trigger implies, then regenerate.
    pub async fn handle_trigger(
        &self,
        trigger: &Trigger,
        options: GenerateOptions,
    ) -> Result<GenerationResult> {
        match trigger {
            Trigger::FileSaved(path) => {
                let removed = self.invalidate_paths(std::slice::from_ref(path));
                log::debug!("File saved: {path} ({removed} cache entries dropped)");
            }
            Trigger::VcsCommit => {
                let removed = self.cache.invalidate_workspace(&self.workspace_id);
                self.session.lock().await.previous = None;
                log::info!("Commit boundary: {removed} workspace cache entries dropped");
            }
            Trigger::FileOpened(path) => {
                self.session
                    .lock()
                    .await
                    .open_files
                    .insert(normalize_rel_path(path));
            }
            Trigger::FileClosed(path) => {
                self.session
                    .lock()
                    .await
                    .open_files
                    .remove(&normalize_rel_path(path));
            }
        }
        self.generate(options).await
    }

    pub async fn generate(&self, options: GenerateOptions) -> Result<GenerationResult> {
        options.validate()?;
        self.check_workspace(&options.workspace)?;

        let started = Instant::now();
        let cache_before = self.cache.stats().total;

        let vcs = probe_vcs(&self.root).await;
        let revision = options
            .revision
            .clone()
            .or_else(|| vcs.as_ref().map(|v| v.revision.clone()));

        let (tree, changes, open_files) = self.advance_baseline(revision.clone()).await?;
        log::info!(
            "Workspace diff: {} added, {} modified, {} deleted, {} unchanged",
            changes.added.len(),
            changes.modified.len(),
            changes.deleted.len(),
            changes.unchanged
        );

        let selector = FileSelector::new(
            &self.root,
            self.builder.matcher().clone(),
            self.scorer.compiled_rules().clone(),
            self.config.selector.clone(),
        );
        let selection = {
            let options = options.clone();
            let tree = tree.clone();
            tokio::task::spawn_blocking(move || selector.select(&options, Some(tree.as_ref())))
                .await
                .map_err(|e| EngineError::Other(format!("selection task failed: {e}")))??
        };

        let analyzed = self.analyze(&selection.files, &tree).await;

        let mut hint = options.working_set.clone();
        hint.open_files.extend(open_files);
        let working_set = WorkingSet::from_sources(&hint, vcs.as_ref());
        let all_paths = tree.file_paths();
        let tests = TestIndex::from_paths(all_paths.iter().map(String::as_str));
        let ctx = ScoringContext::new(&options.task, working_set, tests);

        let facts: Vec<FileFacts> = analyzed
            .iter()
            .map(|file| {
                let facts = FileFacts::new(file.path.clone()).with_parsed(file.parsed.clone());
                match tree.find(&file.path).and_then(|n| n.modified_ms) {
                    Some(modified) => facts.modified_at(modified),
                    None => facts,
                }
            })
            .collect();
        let scorer = self.scorer.clone().at(crate::now_ms());
        let mut ranked = scorer.rank(&facts, &ctx);
        let boosts = self.learning.apply(&options.task, &mut ranked);
        log::debug!(
            "Ranked {} files ({} similar past tasks)",
            ranked.len(),
            boosts.patterns_used
        );

        let by_path: HashMap<&str, &Analyzed> =
            analyzed.iter().map(|a| (a.path.as_str(), a)).collect();

        let limit = options
            .token_limit
            .unwrap_or(self.config.tokens.default_limit);
        let budget = self.config.tokens.shares.split(limit);
        let candidates: Vec<BudgetCandidate> = ranked
            .iter()
            .filter_map(|scored| {
                by_path.get(scored.path.as_str()).map(|a| BudgetCandidate {
                    path: scored.path.clone(),
                    tokens: a.tokens,
                    score: scored.score,
                })
            })
            .collect();
        let picked = optimize_for_limit(candidates, budget.content);
        if picked.over_budget {
            log::warn!(
                "Top file exceeds the content budget of {} tokens; returning it anyway",
                budget.content
            );
        }
        let picked_paths: BTreeSet<&str> = picked.selected.iter().map(|c| c.path.as_str()).collect();

        let entries: Vec<FileMapEntry> = analyzed
            .iter()
            .map(|a| FileMapEntry {
                path: a.path.clone(),
                tokens: a.tokens,
                selected: picked_paths.contains(a.path.as_str()),
            })
            .collect();
        let file_map = render_file_map(&entries, budget.file_map);

        let code_map = if options.include_code_map {
            let ordered: Vec<(String, Arc<ParsedFile>)> = ranked
                .iter()
                .filter_map(|s| {
                    by_path
                        .get(s.path.as_str())
                        .map(|a| (s.path.clone(), a.parsed.clone()))
                })
                .collect();
            Some(self.code_map(&tree, &options.task, &ordered, budget.code_map))
        } else {
            None
        };

        let mut selected_files = Vec::with_capacity(picked.selected.len());
        for candidate in &picked.selected {
            let language = by_path
                .get(candidate.path.as_str())
                .map_or_else(
                    || Language::from_path(&candidate.path).as_str().to_string(),
                    |a| a.parsed.language.clone(),
                );
            let content = if options.include_contents {
                match tokio::fs::read(self.root.join(&candidate.path)).await {
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(err) => {
                        log::warn!("Failed to read selected file {}: {err}", candidate.path);
                        None
                    }
                }
            } else {
                None
            };
            selected_files.push(SelectedFile {
                path: candidate.path.clone(),
                score: candidate.score,
                tokens: candidate.tokens,
                language,
                content,
            });
        }

        self.learning.record_selection(&options.task, &picked.paths());

        let cache_after = self.cache.stats().total;
        let code_map_tokens = code_map.as_ref().map_or(0, |s| s.tokens);
        let metadata = GenerationMetadata {
            total_tokens: file_map.tokens + code_map_tokens + picked.used_tokens,
            file_map_tokens: file_map.tokens,
            code_map_tokens,
            content_tokens: picked.used_tokens,
            file_count: analyzed.len(),
            selected_count: selected_files.len(),
            symbol_count: analyzed.iter().map(|a| a.parsed.symbols.len()).sum(),
            cache: CacheCounters {
                hits: cache_after.hits.saturating_sub(cache_before.hits),
                misses: cache_after.misses.saturating_sub(cache_before.misses),
            },
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            budget,
            changes: ChangeSummary {
                added: changes.added.len(),
                modified: changes.modified.len(),
                deleted: changes.deleted.len(),
                unchanged: changes.unchanged,
            },
            truncated: file_map.truncated
                || code_map.as_ref().is_some_and(|s| s.truncated)
                || picked.dropped > 0,
            revision,
            root_hash: tree.root_hash().to_string(),
        };

        log::info!(
            "Generated context: {} candidates, {} selected, {} tokens in {} ms",
            metadata.file_count,
            metadata.selected_count,
            metadata.total_tokens,
            metadata.elapsed_ms
        );

        Ok(GenerationResult {
            file_map: file_map.content,
            code_map: code_map.map(|section| section.content),
            selected_files: Some(selected_files),
            metadata,
        })
    }

    fn check_workspace(&self, workspace: &Path) -> Result<()> {
        let requested = canonical_root(workspace)?;
        if requested != self.root {
            return Err(EngineError::InvalidPath(format!(
                "{} is not the engine workspace {}",
                requested.display(),
                self.root.display()
            )));
        }
        Ok(())
    }

    /// Read, token-count and parse every candidate; parse results come from
    /// the cache when the content hash is known.
    async fn analyze(&self, paths: &[String], tree: &MerkleTree) -> Vec<Analyzed> {
        let jobs: Vec<(String, Option<String>)> = paths
            .iter()
            .map(|p| (p.clone(), tree.file_hash(p).map(str::to_string)))
            .collect();
        let root = self.root.clone();
        let parser = self.parser.clone();
        let cache = self.cache.clone();

        let results = batch::run_blocking(jobs, self.concurrency, move |(path, hash)| {
            analyze_file(&root, &parser, &cache, path, hash)
        })
        .await;

        let total = results.len();
        let analyzed: Vec<Analyzed> = results.into_iter().flatten().flatten().collect();
        if analyzed.len() < total {
            log::warn!("{} candidates could not be analyzed", total - analyzed.len());
        }
        analyzed
    }

    fn code_map(
        &self,
        tree: &MerkleTree,
        task: &str,
        ordered: &[(String, Arc<ParsedFile>)],
        budget: usize,
    ) -> RenderedSection {
        let mut key = format!("{}\n{task}\n{budget}\n", tree.root_hash());
        for (path, _) in ordered {
            key.push_str(path);
            key.push('\n');
        }
        let state_hash = hash_bytes(key.as_bytes());

        if let Some(cached) = self.cache.get_code_map(&self.workspace_id, &state_hash) {
            return RenderedSection {
                content: cached.content.clone(),
                tokens: cached.tokens,
                truncated: cached.truncated,
                omitted_lines: 0,
            };
        }

        let map = render_code_map(ordered, budget);
        self.cache.save_code_map(
            &self.workspace_id,
            &state_hash,
            Arc::new(CachedCodeMap {
                content: map.section.content.clone(),
                file_count: map.file_count,
                symbol_count: map.symbol_count,
                tokens: map.section.tokens,
                truncated: map.section.truncated,
            }),
        );
        map.section
    }
}

fn analyze_file(
    root: &Path,
    parser: &SymbolParser,
    cache: &CacheManager,
    path: String,
    hash: Option<String>,
) -> Option<Analyzed> {
    let bytes = match std::fs::read(root.join(&path)) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("Skipping unreadable candidate {path}: {err}");
            return None;
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let hash = hash.unwrap_or_else(|| hash_bytes(&bytes));
    let parsed = match cache.get_parsed_file(&path, &hash) {
        Some(parsed) => parsed,
        None => {
            let parsed = Arc::new(parser.parse_source(&path, &text));
            cache.save_parsed_file(&path, &hash, parsed.clone());
            parsed
        }
    };
    let tokens = estimate_tokens(&text, Language::from_path(&path));
    Some(Analyzed {
        path,
        tokens,
        parsed,
    })
}

fn canonical_root(workspace: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(workspace)
        .map_err(|e| EngineError::InvalidPath(format!("{}: {e}", workspace.display())))?;
    if !root.is_dir() {
        return Err(EngineError::InvalidPath(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn memory_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.cache.durable = false;
        config.merkle.hash_metadata = false;
        config
    }

    #[tokio::test]
    async fn failed_build_keeps_session_baseline() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("ws");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.ts"), "export const a = 1;\n").unwrap();

        let generator = ContextGenerator::open(&root, memory_config()).unwrap();
        let (first, changes, _) = generator.advance_baseline(None).await.unwrap();
        assert_eq!(changes.added, vec!["src/a.ts".to_string()]);

        std::fs::remove_dir_all(&root).unwrap();
        assert!(generator.advance_baseline(None).await.is_err());
        let kept = generator.previous_tree().await.expect("baseline retained");
        assert!(Arc::ptr_eq(&kept, &first));

        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.ts"), "export const a = 1;\n").unwrap();
        generator.cache().clear_all();

        let (_, changes, _) = generator.advance_baseline(None).await.unwrap();
        assert!(changes.added.is_empty());
        assert!(changes.modified.is_empty());
        assert_eq!(changes.unchanged, 1);
    }
}
