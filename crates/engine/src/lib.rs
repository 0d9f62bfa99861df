//! # Context Engine
//!
//! Turns a workspace and a task description into a token-bounded context.
//!
//! ## Pipeline
//!
//! ```text
//! Workspace
//!     │
//!     ├──> Merkle tree ──> diff against the last pass
//!     │
//!     ├──> Selector (files / folders / patterns, ignore aware)
//!     │      └─> Candidates ──> parse (cached by content hash)
//!     │
//!     ├──> Scorer + learned history
//!     │      └─> Ranked files ──> budget optimizer
//!     │
//!     └──> File map + code map + selected files
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_engine::{ContextGenerator, EngineConfig};
//! use context_protocol::GenerateOptions;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workspace = Path::new("/path/to/project");
//!     let config = EngineConfig::load(workspace, None)?;
//!     let generator = ContextGenerator::open(workspace, config)?;
//!
//!     let result = generator
//!         .generate(GenerateOptions::new(workspace, "fix the login redirect"))
//!         .await?;
//!     println!("{}", result.file_map);
//!     Ok(())
//! }
//! ```

mod code_map;
mod config;
mod error;
mod file_map;
mod generator;
mod section;
mod updater;

pub use code_map::{render_code_map, symbol_line, CodeMap};
pub use config::{
    config_path, EngineConfig, ScoringConfig, TokenConfig, WatchConfig, CACHE_DB_FILE_NAME,
    CONFIG_FILE_NAME, CONTEXT_DIR, DEFAULT_DEBOUNCE_MS, DEFAULT_TOKEN_LIMIT,
};
pub use error::{EngineError, Result};
pub use file_map::{render_file_map, FileMapEntry};
pub use generator::ContextGenerator;
pub use section::RenderedSection;
pub use updater::{FileChange, IncrementalUpdater, WatchHealth};

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
