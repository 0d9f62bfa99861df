//! # Context Cache
//!
//! Two tiers behind one [`CacheManager`]:
//!
//! ```text
//! get ──> memory (LRU, byte ceiling) ──hit──> value
//!            │ miss
//!            └──> SQLite ──hit──> promote into memory ──> value
//!                   │ miss
//!                   └──> None
//!
//! save ──> SQLite + memory (write-through)
//! ```
//!
//! Keys are content-derived: trees by (workspace, revision), parsed files by
//! (path, content hash), code maps by (workspace, state hash).

mod error;
mod manager;
mod memory;
mod metrics;
mod store;
mod types;

pub use error::{CacheError, Result};
pub use manager::{CacheConfig, CacheManager, DEFAULT_MEMORY_CEILING, WORKTREE_REVISION};
pub use memory::{CacheKey, CachePayload, MemoryStats, MemoryTier};
pub use metrics::{CacheMetrics, CacheOperation, CacheStats};
pub use store::DurableStore;
pub use types::{AccessPattern, CachedCodeMap, CoOccurrence};
