//! Ralph loop integration tests
//!
//! Runs the loop against real processes in temporary work trees:
//! - Command gates retrying until the test command passes
//! - Exhaustion branching the failed work in git
//! - Two loops racing for the same directory

#![cfg(unix)]

use coordination::ralph::{
    failed_branch_name, CommandImplementer, CommandTestGate, GitBranchHandOff, RalphConfig,
    RalphError, RalphLoop, CONTEXT_FILE, LOCK_FILE, STATE_FILE,
};
use coordination::GitManager;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

fn sh(script: &str) -> Vec<String> {
    // `$0` is a placeholder so the prompt lands in `$1`
    vec!["-c".to_string(), script.to_string(), "ralph".to_string()]
}

fn config(max_iterations: u32) -> RalphConfig {
    RalphConfig {
        max_iterations,
        implement_timeout_secs: 10,
        test_timeout_secs: 10,
        ..RalphConfig::default()
    }
}

fn init_repo(dir: &Path) {
    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.email", "test@conclave.dev"],
        vec!["config", "user.name", "Conclave Test"],
        vec!["commit", "--allow-empty", "-m", "init"],
    ] {
        let output = Command::new("git")
            .args(&args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_command_gates_retry_until_tests_pass() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let implementer = CommandImplementer::new("sh", sh("echo attempt >> attempts.txt; echo done"));
    let tests = CommandTestGate::with_command(vec![
        "sh".to_string(),
        "-c".to_string(),
        "n=$(wc -l < attempts.txt | tr -d ' '); echo \"attempts: $n\"; [ \"$n\" -ge 2 ] && echo SPEC_PASS".to_string(),
    ]);

    let ralph = RalphLoop::new(
        dir.path(),
        config(5),
        Arc::new(implementer),
        Arc::new(tests),
        Arc::new(GitBranchHandOff),
    );

    let outcome = ralph.run_with_id("count to two", "ralph-int-1").await.unwrap();
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.spec_confirmed, Some(true));

    let attempts = std::fs::read_to_string(dir.path().join("attempts.txt")).unwrap();
    assert_eq!(attempts.lines().count(), 2);
    for file in [LOCK_FILE, STATE_FILE, CONTEXT_FILE] {
        assert!(!dir.path().join(file).exists(), "{file} left behind");
    }
}

#[tokio::test]
async fn test_prompt_reaches_implementer() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let implementer = CommandImplementer::new("sh", sh("printf '%s' \"$1\" > prompt.txt"));
    let ralph = RalphLoop::new(
        dir.path(),
        RalphConfig {
            skip_spec: true,
            ..config(1)
        },
        Arc::new(implementer),
        Arc::new(CommandTestGate::detect()),
        Arc::new(GitBranchHandOff),
    );

    let outcome = ralph.run_with_id("write the prompt down", "ralph-int-2").await.unwrap();
    assert_eq!(outcome.spec_confirmed, None);
    let prompt = std::fs::read_to_string(dir.path().join("prompt.txt")).unwrap();
    assert_eq!(prompt, "write the prompt down");
}

#[tokio::test]
async fn test_exhaustion_branches_failed_work() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    let implementer = CommandImplementer::new(
        "sh",
        sh("echo partial >> work.txt; echo 'error: still broken' >&2; exit 1"),
    );
    let ralph = RalphLoop::new(
        dir.path(),
        config(2),
        Arc::new(implementer),
        Arc::new(CommandTestGate::detect()),
        Arc::new(GitBranchHandOff),
    );

    let err = ralph.run_with_id("never works", "ralph-int-3").await.unwrap_err();
    assert!(matches!(err, RalphError::MaxIterationsReached { max: 2 }));

    let git = GitManager::new(dir.path());
    assert_eq!(git.current_branch().unwrap(), "main");
    let branch = failed_branch_name("ralph-int-3");
    let files = git.diff_name_only("main", &branch).unwrap();
    assert_eq!(files, vec!["work.txt"]);

    for file in [LOCK_FILE, STATE_FILE, CONTEXT_FILE] {
        assert!(!dir.path().join(file).exists(), "{file} left behind");
    }
}

#[tokio::test]
async fn test_concurrent_loops_exclude_each_other() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let make_loop = || {
        RalphLoop::new(
            dir.path(),
            config(1),
            Arc::new(CommandImplementer::new("sh", sh("sleep 1"))),
            Arc::new(CommandTestGate::detect()),
            Arc::new(GitBranchHandOff),
        )
    };
    let first = make_loop();
    let second = make_loop();

    let (a, b) = tokio::join!(
        first.run_with_id("task", "ralph-a"),
        second.run_with_id("task", "ralph-b")
    );

    let results = [a, b];
    let held = results
        .iter()
        .filter(|r| matches!(r, Err(RalphError::LockHeld { .. })))
        .count();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(held, 1);
    assert_eq!(succeeded, 1);
    assert!(!dir.path().join(LOCK_FILE).exists());
}
