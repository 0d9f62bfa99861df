use crate::error::{MerkleError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Entries skipped while walking a workspace: VCS metadata, dependency and
/// build output, OS droppings, logs and env files.
pub const DEFAULT_IGNORE_GLOBS: &[&str] = &[
    "**/.git/**",
    "**/.hg/**",
    "**/.svn/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.next/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/.context/**",
    "**/.DS_Store",
    "**/Thumbs.db",
    "**/*.log",
    "**/.env",
    "**/.env.*",
];

/// Compiled ignore-glob list matched against workspace-relative paths.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl IgnoreMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            add_glob(&mut builder, raw)?;
            // `dir/**` should also prune `dir` itself so the walk never descends.
            if let Some(prefix) = raw.strip_suffix("/**") {
                if !prefix.is_empty() {
                    add_glob(&mut builder, prefix)?;
                }
            }
            kept.push(raw.to_string());
        }
        let set = builder.build().map_err(|e| MerkleError::InvalidPattern {
            pattern: kept.join(","),
            message: e.to_string(),
        })?;
        Ok(Self {
            set,
            patterns: kept,
        })
    }

    pub fn with_defaults() -> Self {
        // The default table is static and known-good.
        Self::new(DEFAULT_IGNORE_GLOBS).unwrap_or_else(|_| Self::empty())
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        !rel_path.is_empty() && self.set.is_match(rel_path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn add_glob(builder: &mut GlobSetBuilder, pattern: &str) -> Result<()> {
    let glob = Glob::new(pattern).map_err(|e| MerkleError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    builder.add(glob);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_prune_vendor_and_vcs_dirs() {
        let matcher = IgnoreMatcher::with_defaults();
        assert!(matcher.is_ignored(".git"));
        assert!(matcher.is_ignored(".git/HEAD"));
        assert!(matcher.is_ignored("web/node_modules"));
        assert!(matcher.is_ignored("web/node_modules/react/index.js"));
        assert!(matcher.is_ignored("server.log"));
        assert!(matcher.is_ignored("config/.env.local"));
        assert!(!matcher.is_ignored("src/main.ts"));
        assert!(!matcher.is_ignored("src/environment.ts"));
    }

    #[test]
    fn rejects_malformed_globs() {
        assert!(IgnoreMatcher::new(["src/[oops"]).is_err());
    }
}
