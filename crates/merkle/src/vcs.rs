//! Best-effort git probe. Absence of git, or a non-repository, yields `None`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

const GIT_TIMEOUT: Duration = Duration::from_secs(2);
const RECENT_COMMITS: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VcsState {
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Paths with uncommitted changes, workspace-relative.
    #[serde(default)]
    pub uncommitted: Vec<String>,
    /// Paths touched by the last few commits, most recent first, deduplicated.
    #[serde(default)]
    pub recent: Vec<String>,
}

async fn git(root: &Path, args: &[&str]) -> Option<Vec<u8>> {
    let output = timeout(
        GIT_TIMEOUT,
        tokio::process::Command::new("git")
            .arg("-C")
            .arg(root)
            .args(args)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(output.stdout)
}

/// HEAD revision of the repository containing `root`.
pub async fn probe_revision(root: &Path) -> Option<String> {
    let out = git(root, &["rev-parse", "HEAD"]).await?;
    let head = String::from_utf8_lossy(&out).trim().to_string();
    (!head.is_empty()).then_some(head)
}

pub async fn probe_vcs(root: &Path) -> Option<VcsState> {
    let revision = probe_revision(root).await?;

    let branch = git(root, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .map(|out| String::from_utf8_lossy(&out).trim().to_string())
        .filter(|b| !b.is_empty() && b != "HEAD");

    // Both commands report repository-relative paths even when scoped to `.`.
    let prefix = git(root, &["rev-parse", "--show-prefix"])
        .await
        .map(|out| String::from_utf8_lossy(&out).trim().to_string())
        .unwrap_or_default();

    let uncommitted = git(root, &["status", "--porcelain", "-z", "-uall", "--", "."])
        .await
        .map(|out| scope_to_workspace(parse_porcelain_z(&out), &prefix))
        .unwrap_or_default();

    let log_depth = format!("-n{RECENT_COMMITS}");
    let recent = git(
        root,
        &["log", &log_depth, "--name-only", "--pretty=format:", "--", "."],
    )
    .await
    .map(|out| scope_to_workspace(parse_name_only(&out), &prefix))
    .unwrap_or_default();

    Some(VcsState {
        revision,
        branch,
        uncommitted,
        recent,
    })
}

/// Paths from `git status --porcelain -z`; rename records carry a second path we skip.
fn parse_porcelain_z(raw: &[u8]) -> Vec<String> {
    let tokens: Vec<&[u8]> = raw.split(|b| *b == 0).filter(|s| !s.is_empty()).collect();
    let mut out = Vec::new();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let token = tokens[idx];
        idx += 1;
        if token.len() < 4 {
            continue;
        }
        let status = &token[..2];
        let path = String::from_utf8_lossy(&token[3..]).into_owned();
        if status.contains(&b'R') || status.contains(&b'C') {
            // The original path follows as its own token.
            idx += 1;
        }
        out.push(path);
    }
    out.sort();
    out.dedup();
    out
}

fn parse_name_only(raw: &[u8]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert((*line).to_string()))
        .map(str::to_string)
        .collect()
}

/// Rewrites repository-relative paths under `prefix` as workspace-relative; drops the rest.
fn scope_to_workspace(paths: Vec<String>, prefix: &str) -> Vec<String> {
    if prefix.is_empty() {
        return paths;
    }
    paths
        .into_iter()
        .filter_map(|path| path.strip_prefix(prefix).map(str::to_string))
        .filter(|path| !path.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_porcelain_with_renames() {
        let raw = b" M src/a.ts\0?? new.ts\0R  moved.ts\0old.ts\0";
        assert_eq!(
            parse_porcelain_z(raw),
            vec!["moved.ts".to_string(), "new.ts".to_string(), "src/a.ts".to_string()]
        );
    }

    #[test]
    fn parses_name_only_log_deduplicated() {
        let raw = b"src/a.ts\nsrc/b.ts\n\nsrc/a.ts\nREADME.md\n";
        assert_eq!(parse_name_only(raw), vec!["src/a.ts", "src/b.ts", "README.md"]);
    }

    #[test]
    fn scoping_strips_prefix_and_drops_outside_paths() {
        let paths = vec![
            "pkg/src/a.ts".to_string(),
            "other/b.ts".to_string(),
            "pkg/".to_string(),
            "pkg/README.md".to_string(),
        ];
        assert_eq!(
            scope_to_workspace(paths.clone(), "pkg/"),
            vec!["src/a.ts", "README.md"]
        );
        assert_eq!(scope_to_workspace(paths.clone(), ""), paths);
    }

    fn run_git(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args([
                "-c",
                "user.name=ctx",
                "-c",
                "user.email=ctx@localhost",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn subdirectory_workspace_reports_workspace_relative_paths() {
        let temp = tempfile::tempdir().unwrap();
        let repo = temp.path();
        if !run_git(repo, &["init", "-q"]) {
            return;
        }
        let pkg = repo.join("pkg");
        std::fs::create_dir_all(pkg.join("src")).unwrap();
        std::fs::create_dir_all(repo.join("other")).unwrap();
        std::fs::write(pkg.join("src/a.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(repo.join("other/c.ts"), "export const c = 1;\n").unwrap();
        assert!(run_git(repo, &["add", "."]));
        assert!(run_git(repo, &["commit", "-q", "-m", "init"]));

        std::fs::write(pkg.join("src/a.ts"), "export const a = 2;\n").unwrap();
        std::fs::create_dir_all(pkg.join("newdir")).unwrap();
        std::fs::write(pkg.join("newdir/b.ts"), "export const b = 1;\n").unwrap();
        std::fs::write(repo.join("other/c.ts"), "export const c = 2;\n").unwrap();

        let state = probe_vcs(&pkg).await.expect("repository state");
        assert_eq!(state.uncommitted, vec!["newdir/b.ts", "src/a.ts"]);
        assert_eq!(state.recent, vec!["src/a.ts"]);
    }

    #[tokio::test]
    async fn non_repository_yields_none() {
        let temp = tempfile::tempdir().unwrap();
        assert!(probe_revision(temp.path()).await.is_none());
    }
}
