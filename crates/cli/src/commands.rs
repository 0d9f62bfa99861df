use crate::output::{print_json, print_json_line};
use crate::SelectionArgs;
use anyhow::{Context as AnyhowContext, Result};
use context_cache::CacheStats;
use context_engine::{ContextGenerator, IncrementalUpdater};
use context_merkle::{probe_revision, TreeDiff};
use context_protocol::GenerateOptions;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Serialize)]
struct TreeOutput<'a> {
    workspace_id: &'a str,
    root_hash: &'a str,
    total_files: usize,
    revision: Option<&'a str>,
}

#[derive(Serialize)]
struct DiffOutput<'a> {
    root_hash: &'a str,
    revision: Option<&'a str>,
    #[serde(flatten)]
    diff: &'a TreeDiff,
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    workspace_id: &'a str,
    #[serde(flatten)]
    stats: &'a CacheStats,
    learned_patterns: usize,
}

#[derive(Serialize)]
struct InvalidateOutput<'a> {
    scope: &'a str,
    removed: usize,
}

#[derive(Serialize)]
struct PruneOutput {
    removed: usize,
    retention_days: u64,
    remaining_patterns: usize,
}

fn build_options(generator: &ContextGenerator, task: &str, selection: &SelectionArgs) -> GenerateOptions {
    let mut options = GenerateOptions::new(generator.root(), task);
    options.files = selection.files.clone();
    options.folders = selection.folders.clone();
    options.patterns = selection.patterns.clone();
    options.ignore_files = selection.ignore_files.clone();
    options.token_limit = selection.limit;
    options.include_code_map = !selection.no_code_map;
    options.include_contents = selection.contents;
    options
}

pub(crate) async fn run_generate(
    generator: &ContextGenerator,
    task: &str,
    selection: &SelectionArgs,
    pretty: bool,
) -> Result<()> {
    let options = build_options(generator, task, selection);
    let result = generator
        .generate(options)
        .await
        .context("Context generation failed")?;
    print_json(&result, pretty)
}

pub(crate) async fn run_tree(generator: &ContextGenerator) -> Result<()> {
    let revision = probe_revision(generator.root()).await;
    let tree = generator
        .build_tree(revision)
        .await
        .context("Failed to build workspace tree")?;
    print_json(
        &TreeOutput {
            workspace_id: generator.workspace_id(),
            root_hash: tree.root_hash(),
            total_files: tree.total_files(),
            revision: tree.revision.as_deref(),
        },
        false,
    )
}

pub(crate) async fn run_diff(generator: &ContextGenerator) -> Result<()> {
    let (diff, tree) = generator
        .diff_against_cached()
        .await
        .context("Failed to diff workspace")?;
    print_json(
        &DiffOutput {
            root_hash: tree.root_hash(),
            revision: tree.revision.as_deref(),
            diff: &diff,
        },
        false,
    )
}

pub(crate) async fn run_watch(
    generator: ContextGenerator,
    task: &str,
    selection: &SelectionArgs,
    debounce_ms: Option<u64>,
) -> Result<()> {
    let generator = Arc::new(generator);
    let options = build_options(&generator, task, selection);
    let mut config = generator.config().watch.clone();
    if let Some(ms) = debounce_ms {
        config.debounce_ms = ms;
    }

    let initial = generator
        .generate(options.clone())
        .await
        .context("Initial context generation failed")?;
    log::info!(
        "Initial context: {} files selected, {} tokens",
        initial.metadata.selected_count,
        initial.metadata.total_tokens
    );

    let updater = IncrementalUpdater::new(generator, options, config);
    let mut events = updater.subscribe();
    updater.start().await.context("Failed to start file watcher")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping watcher");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_json_line(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Event stream lagged; {skipped} events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    updater.stop().await;
    Ok(())
}

pub(crate) fn run_stats(generator: &ContextGenerator, reset: bool) -> Result<()> {
    let stats = generator.cache().stats();
    print_json(
        &StatsOutput {
            workspace_id: generator.workspace_id(),
            stats: &stats,
            learned_patterns: generator.learning().pattern_count(),
        },
        false,
    )?;
    if reset {
        generator.cache().reset_metrics();
        log::info!("Cache counters reset");
    }
    Ok(())
}

pub(crate) fn run_invalidate(generator: &ContextGenerator, files: &[String]) -> Result<()> {
    let output = if files.is_empty() {
        InvalidateOutput {
            scope: "workspace",
            removed: generator.cache().invalidate_workspace(generator.workspace_id()),
        }
    } else {
        InvalidateOutput {
            scope: "files",
            removed: generator.invalidate_paths(files),
        }
    };
    print_json(&output, false)
}

pub(crate) fn run_prune(generator: &ContextGenerator) -> Result<()> {
    let learning = generator.learning();
    let removed = learning.prune();
    print_json(
        &PruneOutput {
            removed,
            retention_days: generator.config().scoring.learning.retention_days,
            remaining_patterns: learning.pattern_count(),
        },
        false,
    )
}
