//! # Context Merkle
//!
//! Content-addressed snapshots of a workspace and cheap comparisons between them.
//!
//! ```text
//! workspace ──walk (ignore globs)──> files ──hash (batched)──> leaves
//!                                                │
//!                          sorted "name:hash" ───┴──> directory digests ──> root
//!
//! diff(old, new): equal hashes ⇒ skip subtree, count as unchanged
//!                 differing    ⇒ descend into the union of child names
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_merkle::{diff, BuilderConfig, TreeBuilder};
//!
//! # async fn run() -> context_merkle::Result<()> {
//! let builder = TreeBuilder::new(BuilderConfig::default())?;
//! let before = builder.build("/path/to/repo".as_ref()).await?;
//! let after = builder.build("/path/to/repo".as_ref()).await?;
//! let changes = diff(&before, &after);
//! println!("{} modified, {} unchanged", changes.modified.len(), changes.unchanged);
//! # Ok(())
//! # }
//! ```

pub mod batch;
mod builder;
mod diff;
mod error;
mod hash;
mod ignore;
mod node;
mod vcs;

pub use builder::{BuilderConfig, TreeBuilder};
pub use diff::{diff, diff_from_empty, TreeDiff};
pub use error::{MerkleError, Result};
pub use hash::{hash_bytes, hash_directory, hash_file, workspace_id};
pub use ignore::{IgnoreMatcher, DEFAULT_IGNORE_GLOBS};
pub use node::{MerkleNode, MerkleTree, NodeKind};
pub use vcs::{probe_revision, probe_vcs, VcsState};
