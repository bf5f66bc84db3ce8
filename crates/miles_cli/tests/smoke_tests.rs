//! CLI smoke tests: basic binary behavior.

use std::process::Command;

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_miles"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("goal"));
    assert!(stdout.contains("chat"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("miles_cli"), "Expected crate name in --version output");
}

fn run_on(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    cli_bin()
        .env("LLM_PROVIDER", "mock")
        .arg("--config")
        .arg(dir.join("missing.toml"))
        .arg("--db")
        .arg(dir.join("cli.db"))
        .args(args)
        .output()
        .expect("failed to run")
}

#[test]
fn test_goal_roundtrip_on_temp_database() {
    let dir = tempfile::tempdir().unwrap();
    let run = |args: &[&str]| run_on(dir.path(), args);

    let created = run(&["goal", "new", "--title", "Read more", "--milestone", "One book"]);
    assert!(created.status.success(), "{}", String::from_utf8_lossy(&created.stderr));

    let listed = run(&["goal", "list"]);
    assert!(listed.status.success());
    let stdout = String::from_utf8_lossy(&listed.stdout);
    assert!(stdout.contains("Read more"));
    assert!(stdout.contains("  0%"));

    let summary = run(&["goal", "summary", "--timeframe", "week"]);
    assert!(summary.status.success());
    let stdout = String::from_utf8_lossy(&summary.stdout);
    assert!(stdout.contains("Time to get started on your goals!"));
    assert!(stdout.contains("0 completed, 0 in progress, 1 not started"));

    let bad = run(&["goal", "summary", "--timeframe", "year"]);
    assert!(!bad.status.success());
}

#[test]
fn test_ritual_once_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let run = |args: &[&str]| run_on(dir.path(), args);

    let first = run(&["ritual", "done", "morning", "--note", "Write 500 words"]);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));

    let again = run(&["ritual", "done", "morning"]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already completed today"));

    let status = run(&["ritual", "status"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("[x] morning"));
    assert!(stdout.contains("Write 500 words"));
    assert!(stdout.contains("[ ] evening not done yet"));
}

#[test]
fn test_unknown_backend_fails() {
    let output = cli_bin()
        .args(["--backend", "redis", "motivations"])
        .output()
        .expect("failed to run");
    assert!(!output.status.success());
}
