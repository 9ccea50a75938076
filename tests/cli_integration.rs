//! Integration tests for the strata CLI
//!
//! A small shell script stands in for alembic. It prints canned `history`,
//! `current` and `heads` output and records every call in `calls.log`, so the
//! tests exercise the real binary end to end without a Python install.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const FAKE_ALEMBIC: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "alembic 1.13.1"
  exit 0
fi
shift 2
cmd="$1"
shift
echo "$cmd $*" >> calls.log
case "$cmd" in
  history)
    echo "bbb222 -> ccc333 (head), add orders"
    echo "aaa111 -> bbb222, add users"
    echo "<base> -> aaa111, init schema"
    ;;
  current)
    echo "INFO  [alembic.runtime.migration] Context impl SQLiteImpl." >&2
    printf '%s\n' "${STRATA_FAKE_CURRENT-bbb222}"
    ;;
  heads)
    echo "Rev: ccc333 (head)"
    echo "Parent: bbb222"
    ;;
  list_templates)
    echo "Available templates:"
    echo ""
    echo "generic - Generic single-database configuration."
    echo "async - Generic single-database configuration with an async dbapi."
    echo ""
    echo "Templates are used via the 'init' command, e.g.:"
    ;;
  upgrade)
    if [ "$1" = "broken" ]; then
      echo "FAILED: Can't locate revision identified by 'broken'" >&2
      exit 255
    fi
    echo "INFO  [alembic.runtime.migration] Running upgrade -> $1" >&2
    ;;
esac
"#;

/// Temp project with `alembic.ini` and the fake alembic script
fn project() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("alembic.ini"),
        "# project settings\n[alembic]\nscript_location = migrations\n\n[loggers]\nkeys = root\n",
    )
    .unwrap();

    let script = dir.path().join("fake-alembic");
    std::fs::write(&script, FAKE_ALEMBIC).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir
}

/// Helper to run strata against a project using the fake alembic
fn run_strata(args: &[&str], dir: &Path) -> std::process::Output {
    let script = dir.join("fake-alembic");
    Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("-C")
        .arg(dir)
        .arg("--alembic")
        .arg(&script)
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("STRATA_ALEMBIC")
        .env_remove("STRATA_CONFIG_FILE")
        .output()
        .expect("Failed to execute strata")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn calls(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("calls.log")).unwrap_or_default()
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("strata"));
    assert!(out.contains("alembic"));
    assert!(out.contains("upgrade"));
}

#[test]
fn test_version_flag() {
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("strata"));
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("strata"));
    assert!(out.contains("complete"));
}

// =============================================================================
// Reading Migration State
// =============================================================================

#[cfg(unix)]
#[test]
fn test_version_reports_alembic() {
    let dir = project();
    let output = run_strata(&["version"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("strata"));
    assert!(out.contains("alembic 1.13.1"));
}

#[cfg(unix)]
#[test]
fn test_history_json() {
    let dir = project();
    let output = run_strata(&["history", "--json"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let revisions: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let revisions = revisions.as_array().unwrap();
    assert_eq!(revisions.len(), 3);

    let by_id = |id: &str| revisions.iter().find(|r| r["id"] == id).unwrap().clone();
    assert_eq!(by_id("bbb222")["is_current"], true);
    assert_eq!(by_id("aaa111")["is_applied"], true);
    assert_eq!(by_id("ccc333")["is_applied"], false);
    assert_eq!(by_id("ccc333")["is_head"], true);
    assert_eq!(by_id("aaa111")["parents"], serde_json::json!([]));
}

#[cfg(unix)]
#[test]
fn test_history_tree() {
    let dir = project();
    let output = run_strata(&["history"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("ccc333") && lines[0].contains("add orders"));
    assert!(lines[2].contains("aaa111") && lines[2].contains("init schema"));
}

#[cfg(unix)]
#[test]
fn test_unmigrated_database_is_all_pending() {
    let dir = project();
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("-C")
        .arg(dir.path())
        .arg("--alembic")
        .arg(dir.path().join("fake-alembic"))
        .args(["history", "--json"])
        .current_dir(dir.path())
        .env("STRATA_FAKE_CURRENT", "")
        .output()
        .expect("Failed to execute strata");
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let revisions: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    for rev in revisions.as_array().unwrap() {
        assert_eq!(rev["is_applied"], false);
        assert_eq!(rev["is_current"], false);
    }
}

#[cfg(unix)]
#[test]
fn test_current_and_heads() {
    let dir = project();
    let output = run_strata(&["current"], dir.path());
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "bbb222");

    let output = run_strata(&["heads"], dir.path());
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "ccc333");
    assert!(calls(dir.path()).contains("heads -v"));
}

#[cfg(unix)]
#[test]
fn test_templates() {
    let dir = project();
    let output = run_strata(&["templates"], dir.path());
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("generic"));
    assert!(out.contains("async"));
    assert!(!out.contains("Templates are used"));
}

// =============================================================================
// Graph Export
// =============================================================================

#[cfg(unix)]
#[test]
fn test_graph_json() {
    let dir = project();
    let output = run_strata(&["graph", "--format", "json"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let graph: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 2);

    let current = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == "bbb222")
        .unwrap();
    assert_eq!(current["color"], "#2e7d32");
}

#[cfg(unix)]
#[test]
fn test_graph_dot_to_file() {
    let dir = project();
    let out_path = dir.path().join("graph.dot");
    let output = run_strata(
        &["graph", "--format", "dot", "-o", out_path.to_str().unwrap()],
        dir.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dot = std::fs::read_to_string(&out_path).unwrap();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("\"aaa111\" -> \"bbb222\"") || dot.contains("\"bbb222\" -> \"aaa111\""));
}

// =============================================================================
// Running Migrations
// =============================================================================

#[cfg(unix)]
#[test]
fn test_upgrade_passes_target() {
    let dir = project();
    let output = run_strata(&["upgrade"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(calls(dir.path()).contains("upgrade head"));

    // alembic's own output lands in the output log
    let log = std::fs::read_to_string(dir.path().join(".strata/output.log")).unwrap();
    assert!(log.contains("Running upgrade -> head"));
}

#[cfg(unix)]
#[test]
fn test_downgrade_relative_target() {
    let dir = project();
    let output = run_strata(&["downgrade", "-1"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(calls(dir.path()).contains("downgrade -1"));
}

#[cfg(unix)]
#[test]
fn test_failed_upgrade_reports_error() {
    let dir = project();
    let output = run_strata(&["upgrade", "broken"], dir.path());
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Error:"));
    assert!(err.contains("Can't locate revision"));
    assert!(err.contains("exit code 255"));
}

#[test]
fn test_missing_alembic_executable() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("-C")
        .arg(dir.path())
        .args(["--alembic", "/nonexistent/strata-test-alembic", "current"])
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute strata");

    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to launch"));
}

#[cfg(unix)]
#[test]
fn test_merge_and_revision_arguments() {
    let dir = project();
    let output = run_strata(&["merge", "aaa111", "bbb222", "-m", "join"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(calls(dir.path()).contains("merge aaa111 bbb222 -m join"));

    let output = run_strata(&["revision", "-m", "add index", "--empty"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let log = calls(dir.path());
    assert!(log.contains("revision -m add index"));
    assert!(!log.contains("--autogenerate"));
}

#[cfg(unix)]
#[test]
fn test_sequential_revision_ids() {
    let dir = project();
    std::fs::create_dir_all(dir.path().join(".strata")).unwrap();
    std::fs::write(
        dir.path().join(".strata/config.toml"),
        "[naming]\nsequential_ids = true\npadding = 4\n",
    )
    .unwrap();

    let output = run_strata(&["revision", "-m", "next"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(calls(dir.path()).contains("revision --autogenerate -m next --rev-id 0001"));
}

#[test]
fn test_merge_needs_two_revisions() {
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .args(["merge", "aaa111"])
        .output()
        .expect("Failed to execute");
    assert!(!output.status.success());
}

// =============================================================================
// Settings
// =============================================================================

#[cfg(unix)]
#[test]
fn test_settings_set_patches_ini() {
    let dir = project();
    let output = run_strata(
        &["settings", "set", "script_location=db", "sqlalchemy.url=sqlite:///app.db"],
        dir.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = std::fs::read_to_string(dir.path().join("alembic.ini")).unwrap();
    assert_eq!(
        text,
        "# project settings\n[alembic]\nscript_location = db\nsqlalchemy.url = sqlite:///app.db\n\n[loggers]\nkeys = root\n"
    );

    let output = run_strata(&["settings", "show", "--section", "alembic"], dir.path());
    let out = stdout(&output);
    assert!(out.contains("script_location = db"));
    assert!(!out.contains("[loggers]"));
}

#[cfg(unix)]
#[test]
fn test_settings_set_rejects_bad_pair() {
    let dir = project();
    let before = std::fs::read_to_string(dir.path().join("alembic.ini")).unwrap();
    let output = run_strata(&["settings", "set", "no-equals-sign"], dir.path());
    assert!(!output.status.success());
    assert!(stderr(&output).contains("key=value"));
    let after = std::fs::read_to_string(dir.path().join("alembic.ini")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_settings_missing_ini() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_strata"))
        .arg("-C")
        .arg(dir.path())
        .args(["settings", "show"])
        .env("NO_COLOR", "1")
        .env_remove("STRATA_CONFIG_FILE")
        .output()
        .expect("Failed to execute strata");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("alembic.ini"));
}
