//! Gate collaborators for the ralph loop
//!
//! The loop only sees the traits; the command-backed implementations here
//! are what the CLI wires in. Each external process runs in its own process
//! group with `kill_on_drop`, so a timed-out gate takes its children with it.

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::lock::LOCK_FILE;
use super::state::{RalphState, CONTEXT_FILE, STATE_FILE};
use crate::git::GitManager;

/// Marker an implementation or test run prints to confirm spec compliance
pub const SPEC_PASS_MARKER: &str = "SPEC_PASS";

/// A gate that did not pass; the output feeds the next attempt's context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct GateFailure {
    pub reason: String,
    pub output: String,
}

impl GateFailure {
    pub fn new(reason: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            output: output.into(),
        }
    }

    /// A gate that ran past its deadline
    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(format!("Gate timed out after {}s", timeout.as_secs()), "")
    }

    /// Reason and output combined, as recorded in the loop context.
    pub fn details(&self) -> String {
        if self.output.trim().is_empty() {
            self.reason.clone()
        } else {
            format!("{}\n{}", self.reason, self.output)
        }
    }
}

/// Gate outcome: combined output on success
pub type GateResult = Result<String, GateFailure>;

/// Attempts the task, typically by running an agent CLI in the work tree
#[async_trait]
pub trait Implementer: Send + Sync {
    async fn implement(&self, prompt: &str, dir: &Path, timeout: Duration) -> GateResult;
}

/// Runs the project's test suite
#[async_trait]
pub trait TestGate: Send + Sync {
    async fn run_tests(&self, dir: &Path, timeout: Duration) -> GateResult;
}

/// Preserves incomplete work once the iteration budget is spent.
///
/// Returns a description of where the work went.
#[async_trait]
pub trait HandOff: Send + Sync {
    async fn hand_off(&self, dir: &Path, state: &RalphState) -> anyhow::Result<String>;
}

/// Run a command in `dir` under `timeout`, returning stdout and stderr
/// combined. Spawn errors, timeouts and non-zero exits are gate failures.
pub async fn run_gate_command(
    cmd: &mut tokio::process::Command,
    dir: &Path,
    timeout: Duration,
) -> GateResult {
    cmd.current_dir(dir).kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(GateFailure::new(format!("Failed to execute: {e}"), "")),
        Err(_) => return Err(GateFailure::timed_out(timeout)),
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    if output.status.success() {
        Ok(combined)
    } else {
        let reason = match output.status.code() {
            Some(code) => format!("Exited with status {code}"),
            None => "Terminated by signal".to_string(),
        };
        Err(GateFailure::new(reason, combined))
    }
}

/// Runs an agent CLI with the prompt as its final argument.
#[derive(Debug, Clone)]
pub struct CommandImplementer {
    program: String,
    args: Vec<String>,
}

impl CommandImplementer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for CommandImplementer {
    /// `claude -p <prompt>`
    fn default() -> Self {
        Self::new("claude", vec!["-p".to_string()])
    }
}

#[async_trait]
impl Implementer for CommandImplementer {
    async fn implement(&self, prompt: &str, dir: &Path, timeout: Duration) -> GateResult {
        debug!(program = %self.program, prompt_len = prompt.len(), "Running implementer");
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).arg(prompt);
        run_gate_command(&mut cmd, dir, timeout).await
    }
}

/// Test command for the project in `dir`, by marker file.
pub fn detect_test_command(dir: &Path) -> Option<Vec<String>> {
    let command: &[&str] = if dir.join("Cargo.toml").exists() {
        &["cargo", "test"]
    } else if dir.join("package.json").exists() {
        &["npm", "test"]
    } else if dir.join("go.mod").exists() {
        &["go", "test", "./..."]
    } else if dir.join("pyproject.toml").exists() || dir.join("setup.py").exists() {
        &["pytest"]
    } else if dir.join("Makefile").exists() {
        &["make", "test"]
    } else {
        return None;
    };
    Some(command.iter().map(|s| s.to_string()).collect())
}

/// Runs an explicit test command, or the one detected for the project.
#[derive(Debug, Clone, Default)]
pub struct CommandTestGate {
    command: Option<Vec<String>>,
}

impl CommandTestGate {
    /// Detect the test command per run
    pub fn detect() -> Self {
        Self::default()
    }

    /// Always run `command`; an empty command passes trivially.
    pub fn with_command(command: Vec<String>) -> Self {
        Self {
            command: Some(command),
        }
    }
}

#[async_trait]
impl TestGate for CommandTestGate {
    async fn run_tests(&self, dir: &Path, timeout: Duration) -> GateResult {
        let command = match &self.command {
            Some(command) => Some(command.clone()),
            None => detect_test_command(dir),
        };

        let Some((program, args)) = command.as_deref().and_then(|c| c.split_first()) else {
            info!(dir = %dir.display(), "No test suite detected, test gate passes");
            return Ok("No test suite detected; test gate skipped".to_string());
        };

        debug!(program = %program, ?args, "Running test gate");
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        run_gate_command(&mut cmd, dir, timeout).await
    }
}

/// Commits the failed attempt onto `ralph/failed-{task_id}` and returns to
/// the original branch.
#[derive(Debug, Clone, Default)]
pub struct GitBranchHandOff;

/// Branch holding the work of an exhausted run
pub fn failed_branch_name(task_id: &str) -> String {
    format!("ralph/failed-{task_id}")
}

impl GitBranchHandOff {
    /// Blocking git work behind the hand-off
    fn branch_failed_work(dir: &Path, state: &RalphState) -> anyhow::Result<String> {
        let git = GitManager::new(dir);
        let original = git.current_branch()?;
        let branch = failed_branch_name(&state.task_id);

        git.checkout_new_branch(&branch)?;
        let message = format!(
            "ralph: failed work for {} after {} iterations\n\nStrategy shifts: {}\nLast failed gate: {}",
            state.task_id,
            state.max_iterations,
            state.strategy_shift_count,
            state.last_gate.as_deref().unwrap_or("none"),
        );
        let commit = git.commit_all_excluding(&message, &[LOCK_FILE, STATE_FILE, CONTEXT_FILE])?;
        git.checkout(&original)?;

        info!(branch = %branch, commit = %commit, "Failed work branched");
        Ok(branch)
    }
}

#[async_trait]
impl HandOff for GitBranchHandOff {
    async fn hand_off(&self, dir: &Path, state: &RalphState) -> anyhow::Result<String> {
        // GitManager shells out synchronously and sleeps between lock retries
        let dir = dir.to_path_buf();
        let state = state.clone();
        tokio::task::spawn_blocking(move || Self::branch_failed_work(&dir, &state)).await?
    }
}

/// Bound a gate call by `timeout` whether or not the collaborator honours
/// its own deadline. Overrun is an ordinary gate failure.
pub async fn bounded_gate<F>(timeout: Duration, gate: F) -> GateResult
where
    F: Future<Output = GateResult>,
{
    match tokio::time::timeout(timeout, gate).await {
        Ok(result) => result,
        Err(_) => Err(GateFailure::timed_out(timeout)),
    }
}

/// Whether any gate output carries the spec-compliance marker.
pub fn spec_marker_present(outputs: &[&str]) -> bool {
    outputs.iter().any(|o| o.contains(SPEC_PASS_MARKER))
}
