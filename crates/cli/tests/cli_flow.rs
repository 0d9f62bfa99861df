use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn setup_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src/session.ts"),
        "export class Session {\n  refresh() { return true; }\n}\n",
    )
    .unwrap();
    fs::write(root.join("src/util.ts"), "export const pad = (s: string) => s;\n").unwrap();
    temp
}

#[allow(deprecated)]
fn run(root: &Path, args: &[&str]) -> Value {
    let output = Command::cargo_bin("context")
        .expect("binary")
        .arg("--quiet")
        .arg("--workspace")
        .arg(root)
        .args(args)
        .output()
        .expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

#[test]
fn generate_prints_a_json_result() {
    let temp = setup_repo();
    let body = run(
        temp.path(),
        &["--no-durable-cache", "generate", "refresh the session", "--contents"],
    );

    assert_eq!(body["metadata"]["file_count"], 2);
    assert_eq!(body["selected_files"][0]["path"], "src/session.ts");
    assert!(body["selected_files"][0]["content"]
        .as_str()
        .is_some_and(|c| c.contains("refresh")));
    assert!(body["code_map"].as_str().is_some_and(|m| m.contains("Session")));
    assert!(!temp.path().join(".context").exists());
}

#[test]
fn generate_respects_flags() {
    let temp = setup_repo();
    let body = run(
        temp.path(),
        &[
            "--no-durable-cache",
            "generate",
            "padding",
            "--file",
            "src/util.ts",
            "--no-code-map",
        ],
    );
    assert_eq!(body["metadata"]["file_count"], 1);
    assert!(body["code_map"].is_null());
    assert!(body["selected_files"][0]["content"].is_null());
}

#[test]
fn diff_uses_the_durable_tree_between_runs() {
    let temp = setup_repo();

    let first = run(temp.path(), &["diff"]);
    assert_eq!(first["added"].as_array().map(Vec::len), Some(2));

    let second = run(temp.path(), &["diff"]);
    assert_eq!(second["added"].as_array().map(Vec::len), Some(0));
    assert_eq!(second["unchanged"], 2);
    assert_eq!(second["root_hash"], first["root_hash"]);

    fs::write(temp.path().join("src/util.ts"), "export const pad = 1;\n").unwrap();
    let third = run(temp.path(), &["diff"]);
    assert_eq!(third["modified"][0], "src/util.ts");
}

#[test]
fn tree_stats_and_invalidate_report_json() {
    let temp = setup_repo();

    let tree = run(temp.path(), &["--no-durable-cache", "tree"]);
    assert_eq!(tree["total_files"], 2);
    assert!(tree["root_hash"].as_str().is_some_and(|h| !h.is_empty()));

    run(temp.path(), &["generate", "session"]);
    let stats = run(temp.path(), &["stats"]);
    assert_eq!(stats["durable"], true);

    let invalidated = run(temp.path(), &["invalidate", "--file", "src/util.ts"]);
    assert_eq!(invalidated["scope"], "files");

    let workspace = run(temp.path(), &["invalidate"]);
    assert_eq!(workspace["scope"], "workspace");

    let pruned = run(temp.path(), &["prune"]);
    assert_eq!(pruned["retention_days"], 30);
}

#[test]
#[allow(deprecated)]
fn missing_workspace_fails_with_context() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("gone");

    Command::cargo_bin("context")
        .expect("binary")
        .arg("--quiet")
        .arg("--workspace")
        .arg(&missing)
        .args(["--no-durable-cache", "tree"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Failed to open workspace"));
}

#[test]
#[allow(deprecated)]
fn blank_task_is_rejected() {
    let temp = setup_repo();

    Command::cargo_bin("context")
        .expect("binary")
        .arg("--quiet")
        .arg("--workspace")
        .arg(temp.path())
        .args(["--no-durable-cache", "generate", "   "])
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("Context generation failed")
                .and(predicate::str::contains("invalid `task`")),
        );
}
