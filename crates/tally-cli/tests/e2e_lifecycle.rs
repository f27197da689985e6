//! CLI lifecycle tests: init -> create -> claim -> done, plus the JSON
//! contracts agents script against.
//!
//! Each test runs the `tally` binary as a subprocess in an isolated temp
//! directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the tally binary, rooted in `dir`.
fn tally_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
    cmd.current_dir(dir);
    // Keep the developer's own config out of the run.
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env("HOME", dir);
    cmd.env_remove("FORMAT");
    cmd.env("TALLY_ACTOR", "@alice");
    cmd.env("TALLY_LOG", "error");
    cmd
}

fn init_project(dir: &Path) {
    tally_cmd(dir).args(["init", "--project", "acme"]).assert().success();
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = tally_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn create_task(dir: &Path, args: &[&str]) -> String {
    let mut full = vec!["create"];
    full.extend_from_slice(args);
    let json = json_of(dir, &full);
    json["id"].as_str().expect("create output has an id").to_string()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn init_creates_ledger_and_config() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    let ledger = std::fs::read_to_string(dir.path().join("TASKS.md")).expect("ledger written");
    assert!(ledger.starts_with("---\n"));
    assert!(ledger.contains("project: acme"));
    assert!(dir.path().join(".tally/config.toml").exists());
}

#[test]
fn init_twice_fails_without_touching_the_ledger() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());
    create_task(dir.path(), &["--title", "Keep me"]);
    let before = std::fs::read(dir.path().join("TASKS.md")).expect("read");

    tally_cmd(dir.path())
        .args(["init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"));
    assert_eq!(std::fs::read(dir.path().join("TASKS.md")).expect("read"), before);
}

#[test]
fn commands_before_init_report_not_initialized() {
    let dir = TempDir::new().expect("tempdir");
    tally_cmd(dir.path())
        .args(["list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn create_claim_done_unblocks_dependent() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    let auth = create_task(dir.path(), &["--title", "Build auth", "--priority", "high"]);
    let deploy = create_task(
        dir.path(),
        &["--title", "Deploy", "--status", "blocked", "--depends-on", "1"],
    );
    assert_eq!(auth, "TASK-001");
    assert_eq!(deploy, "TASK-002");

    tally_cmd(dir.path()).args(["claim", &auth]).assert().success();
    let shown = json_of(dir.path(), &["show", &auth]);
    assert_eq!(shown["status"], "in_progress");
    assert_eq!(shown["claimed_by"], "@alice");
    assert_eq!(shown["dependents"], serde_json::json!([deploy]));

    let done = json_of(dir.path(), &["done", &auth, "--note", "merged"]);
    assert_eq!(done["unblocked"], serde_json::json!([deploy]));

    let shown = json_of(dir.path(), &["show", "2"]);
    assert_eq!(shown["status"], "todo");
    let history = shown["history"].as_array().expect("history array");
    let last = history.last().expect("entry");
    assert_eq!(last["action"], "unblocked");
    assert_eq!(last["note"], "unblocked by completion of TASK-001");
}

#[test]
fn second_claimant_is_refused() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());
    let id = create_task(dir.path(), &["--title", "Contended"]);

    tally_cmd(dir.path()).args(["claim", &id]).assert().success();
    tally_cmd(dir.path())
        .args(["claim", &id, "--actor", "@bob"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
}

#[test]
fn mutations_without_an_actor_fail() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    tally_cmd(dir.path())
        .env_remove("TALLY_ACTOR")
        .env_remove("USER")
        .args(["create", "--title", "Nobody", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing_actor"));
}

#[test]
fn list_hides_done_tasks_unless_asked() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());
    let a = create_task(dir.path(), &["--title", "Open one"]);
    let b = create_task(dir.path(), &["--title", "Finished one"]);
    tally_cmd(dir.path()).args(["done", &b]).assert().success();

    let open = json_of(dir.path(), &["list"]);
    let ids: Vec<&str> = open
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|t| t["id"].as_str())
        .collect();
    assert_eq!(ids, vec![a.as_str()]);

    let all = json_of(dir.path(), &["list", "--all"]);
    assert_eq!(all.as_array().expect("array").len(), 2);
}

#[test]
fn next_offers_only_ready_unclaimed_work() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());
    let low = create_task(dir.path(), &["--title", "Later", "--priority", "low"]);
    let urgent = create_task(dir.path(), &["--title", "Now", "--priority", "urgent"]);
    let claimed = create_task(dir.path(), &["--title", "Taken"]);
    create_task(
        dir.path(),
        &["--title", "Waiting", "--status", "blocked", "--depends-on", &low],
    );
    tally_cmd(dir.path()).args(["claim", &claimed]).assert().success();

    let next = json_of(dir.path(), &["next"]);
    let ids: Vec<&str> = next
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|t| t["id"].as_str())
        .collect();
    assert_eq!(ids, vec![urgent.as_str(), low.as_str()]);
}

#[test]
fn edit_rejects_a_dependency_cycle() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());
    let a = create_task(dir.path(), &["--title", "A"]);
    create_task(dir.path(), &["--title", "B", "--depends-on", &a]);

    tally_cmd(dir.path())
        .args(["edit", &a, "--depends-on", "TASK-002"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2006"));
}

#[test]
fn comment_and_reopen_extend_history() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());
    let id = create_task(dir.path(), &["--title", "Flaky"]);

    tally_cmd(dir.path()).args(["comment", &id, "saw it again"]).assert().success();
    tally_cmd(dir.path()).args(["done", &id]).assert().success();
    tally_cmd(dir.path())
        .args(["reopen", &id, "--reason", "regressed"])
        .assert()
        .success();

    let shown = json_of(dir.path(), &["show", &id]);
    assert_eq!(shown["status"], "reopened");
    let actions: Vec<&str> = shown["history"]
        .as_array()
        .expect("history")
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert_eq!(actions, vec!["created", "commented", "completed", "reopened"]);
}
