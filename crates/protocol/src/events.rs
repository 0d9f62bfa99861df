use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// Events emitted by a watching engine, delivered in FIFO order per subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextEvent {
    FileChanged {
        path: String,
        kind: FileChangeKind,
    },
    ContextUpdated {
        paths: Vec<String>,
        duration_ms: u64,
    },
    Error {
        message: String,
    },
}

impl ContextEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Editor and VCS happenings that map to an invalidation before regeneration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "trigger", content = "path", rename_all = "snake_case")]
pub enum Trigger {
    FileSaved(String),
    VcsCommit,
    FileOpened(String),
    FileClosed(String),
}
