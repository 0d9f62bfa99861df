use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Upper bound on accepted task text; longer input is a caller bug, not a big task.
pub const MAX_TASK_CHARS: usize = 16_000;

/// Largest token ceiling a request may ask for.
pub const MAX_TOKEN_LIMIT: usize = 2_000_000;

/// Files the caller already knows are relevant to the session.
///
/// Supplied by an editor or VCS collaborator; the engine merges it with its
/// own probe of the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingSetHint {
    #[serde(default)]
    pub open_files: Vec<String>,
    #[serde(default)]
    pub recent_files: Vec<String>,
    #[serde(default)]
    pub uncommitted_files: Vec<String>,
    /// Symbol names under edit; files declaring them count as half-members.
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Parameters for a single context generation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateOptions {
    pub workspace: PathBuf,
    pub task: String,
    /// Explicit workspace-relative files.
    #[serde(default)]
    pub files: Vec<String>,
    /// Workspace-relative folders, expanded recursively.
    #[serde(default)]
    pub folders: Vec<String>,
    /// Glob patterns matched against workspace-relative paths.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Extra ignore files (gitignore syntax) honored when expanding folders.
    #[serde(default)]
    pub ignore_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<usize>,
    #[serde(default = "default_true")]
    pub include_code_map: bool,
    #[serde(default = "default_true")]
    pub include_contents: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub working_set: WorkingSetHint,
}

const fn default_true() -> bool {
    true
}

impl GenerateOptions {
    pub fn new(workspace: impl Into<PathBuf>, task: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            task: task.into(),
            files: Vec::new(),
            folders: Vec::new(),
            patterns: Vec::new(),
            ignore_files: Vec::new(),
            token_limit: None,
            include_code_map: true,
            include_contents: true,
            revision: None,
            working_set: WorkingSetHint::default(),
        }
    }

    #[must_use]
    pub fn with_token_limit(mut self, limit: usize) -> Self {
        self.token_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Reject malformed parameters before any pipeline work starts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workspace.as_os_str().is_empty() {
            return Err(ValidationError::new("workspace", "must not be empty"));
        }
        if self.task.trim().is_empty() {
            return Err(ValidationError::new("task", "must not be empty"));
        }
        if self.task.chars().count() > MAX_TASK_CHARS {
            return Err(ValidationError::new(
                "task",
                format!("exceeds {MAX_TASK_CHARS} characters"),
            ));
        }
        if let Some(limit) = self.token_limit {
            if limit == 0 {
                return Err(ValidationError::new("token_limit", "must be > 0"));
            }
            if limit > MAX_TOKEN_LIMIT {
                return Err(ValidationError::new(
                    "token_limit",
                    format!("must be <= {MAX_TOKEN_LIMIT}"),
                ));
            }
        }
        for file in &self.files {
            check_relative("files", file)?;
        }
        for folder in &self.folders {
            check_relative("folders", folder)?;
        }
        for pattern in &self.patterns {
            if pattern.trim().is_empty() {
                return Err(ValidationError::new("patterns", "empty pattern"));
            }
            glob::Pattern::new(pattern).map_err(|e| {
                ValidationError::new("patterns", format!("`{pattern}`: {e}"))
            })?;
        }
        Ok(())
    }
}

fn check_relative(field: &str, raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::new(field, "empty path"));
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return Err(ValidationError::new(
            field,
            format!("`{raw}` must be relative to the workspace"),
        ));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ValidationError::new(
            field,
            format!("`{raw}` escapes the workspace"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_minimal_request() {
        let opts = GenerateOptions::new("/repo", "fix main function");
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn rejects_empty_task() {
        let err = GenerateOptions::new("/repo", "   ").validate().unwrap_err();
        assert_eq!(err.field, "task");
    }

    #[test]
    fn rejects_zero_token_limit() {
        let err = GenerateOptions::new("/repo", "task")
            .with_token_limit(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "token_limit");
    }

    #[test]
    fn rejects_escaping_paths() {
        let err = GenerateOptions::new("/repo", "task")
            .with_files(["../secret.txt"])
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "files");
    }

    #[test]
    fn rejects_broken_glob() {
        let err = GenerateOptions::new("/repo", "task")
            .with_patterns(["src/[*.rs"])
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "patterns");
    }

    #[test]
    fn deserializes_with_defaults() {
        let opts: GenerateOptions =
            serde_json::from_str(r#"{"workspace":"/repo","task":"t"}"#).unwrap();
        assert!(opts.include_code_map);
        assert!(opts.include_contents);
        assert!(opts.files.is_empty());
    }
}
