use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const PLAN: &str = "\
# Demo Project

## 1. Setup

### 1.1 Layout
- [ ] Make sources `type=create_directory` `path=src`
- [ ] **Readme** - write the readme `type=create_file` `path=README.md` `content=hello`
- [x] Pick a name
";

fn devplan(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("devplan").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

fn workspace(plan: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("DEV_PLAN.md"), plan).unwrap();
    fs::write(
        dir.path().join("devplan.yaml"),
        "retry:\n  max_attempts: 2\n  backoff_base_ms: 1\n",
    )
    .unwrap();
    dir
}

#[test]
fn schema_describes_config() {
    let dir = tempfile::tempdir().unwrap();
    devplan(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_parallel_tasks"))
        .stdout(predicate::str::contains("backoff_base_ms"));
}

#[test]
fn check_prints_tree_and_warnings() {
    let dir = workspace("# Plan\n- [ ] stray\n\n## 1. Build\n\n### 1.1 Core\n- [ ] compile\n");
    devplan(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("[phase-1] 1. Build"))
        .stdout(predicate::str::contains("[ ] 1.1.1 compile (generic)"))
        .stdout(predicate::str::contains("1 warning(s)"));
}

#[test]
fn check_rejects_empty_plan() {
    let dir = workspace("   \n\n");
    devplan(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn status_reports_progress() {
    let dir = workspace(PLAN);
    devplan(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo Project: 1/3 (33%)"));
}

#[test]
fn run_executes_and_ticks_plan() {
    let dir = workspace(PLAN);
    devplan(dir.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 completed, 0 failed, 1 skipped"));

    assert!(dir.path().join("src").is_dir());
    assert_eq!(
        fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "hello"
    );

    let plan = fs::read_to_string(dir.path().join("DEV_PLAN.md")).unwrap();
    assert_eq!(plan, PLAN.replace("- [ ]", "- [x]"));

    let runs: Vec<_> = fs::read_dir(dir.path().join("reports")).unwrap().collect();
    assert_eq!(runs.len(), 1);
    let run_dir = runs.into_iter().next().unwrap().unwrap().path();
    assert!(run_dir.join("report.md").exists());
    assert!(run_dir.join("report.json").exists());
    assert!(dir.path().join(".devplan/cache.json").exists());

    devplan(dir.path())
        .args(["plugins", "--stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tasks executed: 2"));
}

#[test]
fn dry_run_changes_nothing() {
    let dir = workspace(PLAN);
    devplan(dir.path())
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 completed, 0 failed, 3 skipped"));

    assert_eq!(
        fs::read_to_string(dir.path().join("DEV_PLAN.md")).unwrap(),
        PLAN
    );
    assert!(!dir.path().join("src").exists());
    assert!(!dir.path().join("reports").exists());
}

#[test]
fn failing_task_fails_run_in_ci_mode() {
    let plan = "# P\n\n## 1. Ops\n\n### 1.1 Cmds\n- [ ] ok `type=run_command` `command=true`\n- [ ] bad `type=run_command` `command=exit 4`\n";
    let dir = workspace(plan);
    devplan(dir.path())
        .args(["run", "--fail-on-error", "--no-cache"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("1 completed, 1 failed"));

    let written = fs::read_to_string(dir.path().join("DEV_PLAN.md")).unwrap();
    assert!(written.contains("- [x] ok"));
    assert!(written.contains("- [ ] bad"));
}

#[test]
fn unknown_phase_is_an_error() {
    let dir = workspace(PLAN);
    devplan(dir.path())
        .args(["run", "--phase", "phase-7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("phase-7"));
}

#[test]
fn plugins_lists_builtins_in_order() {
    let dir = tempfile::tempdir().unwrap();
    devplan(dir.path())
        .arg("plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains("filesystem v1.0.0: create_directory, create_file"))
        .stdout(predicate::str::contains("command v1.0.0: run_command"));
}

#[test]
fn cache_stats_and_clear() {
    let dir = workspace(PLAN);
    devplan(dir.path()).arg("run").assert().success();

    devplan(dir.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:    2/10000"));

    devplan(dir.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 cached result(s)"));

    devplan(dir.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:    0/10000"));
}
