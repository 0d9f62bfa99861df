use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use context_engine::{ContextGenerator, EngineConfig};
use std::path::{Path, PathBuf};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "context")]
#[command(about = "Token-bounded code context for a task", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root (defaults to the current directory)
    #[arg(long, short = 'w', global = true, default_value = ".")]
    workspace: PathBuf,

    /// Engine config file (defaults to <workspace>/.context/engine.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep every cache in memory; nothing is written under the workspace
    #[arg(long, global = true)]
    no_durable_cache: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate context for a task and print it as JSON
    Generate(GenerateArgs),

    /// Build the Merkle tree and print its root hash and file count
    Tree,

    /// Diff the workspace against the tree cached for the current revision
    Diff,

    /// Keep the context fresh while files change, printing events as JSON lines
    Watch(WatchArgs),

    /// Show cache hit/miss counters and memory usage
    Stats(StatsArgs),

    /// Drop cached entries for files, or for the whole workspace
    Invalidate(InvalidateArgs),

    /// Delete learned history older than the retention window
    Prune,
}

#[derive(Args, Clone)]
pub(crate) struct SelectionArgs {
    /// Workspace-relative file to consider (repeatable)
    #[arg(long = "file", short = 'f')]
    files: Vec<String>,

    /// Workspace-relative folder to expand recursively (repeatable)
    #[arg(long = "folder")]
    folders: Vec<String>,

    /// Glob pattern matched against workspace-relative paths (repeatable)
    #[arg(long = "pattern", short = 'p')]
    patterns: Vec<String>,

    /// Extra ignore file in gitignore syntax (repeatable)
    #[arg(long = "ignore-file")]
    ignore_files: Vec<String>,

    /// Token ceiling for the whole output
    #[arg(long, short = 'l')]
    limit: Option<usize>,

    /// Skip the code map section
    #[arg(long)]
    no_code_map: bool,

    /// Include file contents for the selected files
    #[arg(long)]
    contents: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// What the context is for
    task: String,

    #[command(flatten)]
    selection: SelectionArgs,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct WatchArgs {
    /// Task the kept-fresh context is generated for
    task: String,

    #[command(flatten)]
    selection: SelectionArgs,

    /// Debounce window in milliseconds (overrides config)
    #[arg(long)]
    debounce_ms: Option<u64>,
}

#[derive(Args)]
struct StatsArgs {
    /// Zero the counters after printing them
    #[arg(long)]
    reset: bool,
}

#[derive(Args)]
struct InvalidateArgs {
    /// Workspace-relative file to invalidate (repeatable); omit for the whole workspace
    #[arg(long = "file", short = 'f')]
    files: Vec<String>,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = load_config(&cli.workspace, cli.config.as_deref(), cli.no_durable_cache)?;
    let generator = ContextGenerator::open(&cli.workspace, config)
        .with_context(|| format!("Failed to open workspace {}", cli.workspace.display()))?;

    match cli.command {
        Commands::Generate(args) => {
            commands::run_generate(&generator, &args.task, &args.selection, args.pretty).await
        }
        Commands::Tree => commands::run_tree(&generator).await,
        Commands::Diff => commands::run_diff(&generator).await,
        Commands::Watch(args) => {
            commands::run_watch(generator, &args.task, &args.selection, args.debounce_ms).await
        }
        Commands::Stats(args) => commands::run_stats(&generator, args.reset),
        Commands::Invalidate(args) => commands::run_invalidate(&generator, &args.files),
        Commands::Prune => commands::run_prune(&generator),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn load_config(workspace: &Path, explicit: Option<&Path>, memory_only: bool) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(workspace, explicit).with_context(|| match explicit {
        Some(path) => format!("Failed to load config {}", path.display()),
        None => "Failed to load engine config".to_string(),
    })?;
    if memory_only {
        config.cache.durable = false;
    }
    Ok(config)
}
