use context_merkle::VcsState;
use context_protocol::{normalize_rel_path, WorkingSetHint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Files relevant to the current session, recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSet {
    pub open_files: BTreeSet<String>,
    pub recent_files: BTreeSet<String>,
    pub uncommitted_files: BTreeSet<String>,
    /// Symbol names under edit.
    pub symbols: BTreeSet<String>,
    pub branch: Option<String>,
}

fn normalized(paths: &[String]) -> impl Iterator<Item = String> + '_ {
    paths
        .iter()
        .map(|p| normalize_rel_path(p))
        .filter(|p| !p.is_empty())
}

impl WorkingSet {
    /// Merge the caller's hint with a VCS probe; either may be empty.
    pub fn from_sources(hint: &WorkingSetHint, vcs: Option<&VcsState>) -> Self {
        let mut set = Self {
            open_files: normalized(&hint.open_files).collect(),
            recent_files: normalized(&hint.recent_files).collect(),
            uncommitted_files: normalized(&hint.uncommitted_files).collect(),
            symbols: hint.symbols.iter().cloned().collect(),
            branch: hint.branch.clone(),
        };
        if let Some(vcs) = vcs {
            set.uncommitted_files.extend(normalized(&vcs.uncommitted));
            set.recent_files.extend(normalized(&vcs.recent));
            if set.branch.is_none() {
                set.branch = vcs.branch.clone();
            }
        }
        set
    }

    /// Whole-file membership: open, uncommitted or recently committed.
    pub fn contains_file(&self, path: &str) -> bool {
        self.open_files.contains(path)
            || self.uncommitted_files.contains(path)
            || self.recent_files.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.open_files.is_empty()
            && self.recent_files.is_empty()
            && self.uncommitted_files.is_empty()
            && self.symbols.is_empty()
    }

    pub fn open(&mut self, path: &str) {
        self.open_files.insert(normalize_rel_path(path));
    }

    pub fn close(&mut self, path: &str) {
        self.open_files.remove(&normalize_rel_path(path));
    }

    /// Every file path mentioned by the set.
    pub fn files(&self) -> BTreeSet<String> {
        self.open_files
            .iter()
            .chain(&self.recent_files)
            .chain(&self.uncommitted_files)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_hint_and_vcs() {
        let hint = WorkingSetHint {
            open_files: vec!["./src/a.ts".to_string()],
            ..WorkingSetHint::default()
        };
        let vcs = VcsState {
            revision: "abc".to_string(),
            branch: Some("main".to_string()),
            uncommitted: vec!["src/b.ts".to_string()],
            recent: vec!["src/c.ts".to_string()],
        };
        let mut set = WorkingSet::from_sources(&hint, Some(&vcs));
        assert!(set.contains_file("src/a.ts"));
        assert!(set.contains_file("src/b.ts"));
        assert!(set.contains_file("src/c.ts"));
        assert_eq!(set.branch.as_deref(), Some("main"));

        set.close("src/a.ts");
        assert!(!set.open_files.contains("src/a.ts"));
        assert_eq!(set.files().len(), 2);
    }
}
