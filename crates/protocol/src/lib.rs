//! # Context Protocol
//!
//! Boundary types for the context engine: what a caller asks for
//! ([`GenerateOptions`]), what it gets back ([`GenerationResult`]), and the
//! events a running engine emits ([`ContextEvent`]).
//!
//! Nothing in this crate touches the filesystem. Requests are validated here
//! so that malformed parameters are rejected before any pipeline work starts.

mod error;
mod events;
pub mod path_filters;
mod request;
mod result;

pub use error::ValidationError;
pub use events::{ContextEvent, FileChangeKind, Trigger};
pub use request::{GenerateOptions, WorkingSetHint, MAX_TASK_CHARS, MAX_TOKEN_LIMIT};
pub use result::{
    CacheCounters, ChangeSummary, GenerationMetadata, GenerationResult, SelectedFile, TokenBudget,
};

/// Normalize a workspace-relative path to forward slashes without a leading `./`.
pub fn normalize_rel_path(raw: &str) -> String {
    let mut value = raw.trim().replace('\\', "/");
    while let Some(rest) = value.strip_prefix("./") {
        value = rest.to_string();
    }
    value.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::normalize_rel_path;

    #[test]
    fn normalizes_separators_and_prefixes() {
        assert_eq!(normalize_rel_path("./src\\lib.rs"), "src/lib.rs");
        assert_eq!(normalize_rel_path("/src/a.ts"), "src/a.ts");
        assert_eq!(normalize_rel_path("././b.ts"), "b.ts");
    }
}
