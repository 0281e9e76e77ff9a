//! Persisted loop state
//!
//! The loop re-reads its state from disk at the top of every iteration, so a
//! crashed run leaves an inspectable `.ralph_state.json` and the failure
//! history that fed the prompts in `.ralph_context.md`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::{RalphError, RalphResult};
use super::stuck::failure_signature;

/// State file name inside the working directory
pub const STATE_FILE: &str = ".ralph_state.json";

/// Accumulated failure context, appended to every prompt
pub const CONTEXT_FILE: &str = ".ralph_context.md";

/// Failure output kept per context entry
const CONTEXT_TAIL_CHARS: usize = 8000;

/// Gate names recorded on failure
pub const GATE_IMPLEMENT: &str = "implement";
pub const GATE_TESTS: &str = "tests";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RalphState {
    pub task_id: String,
    /// 1-based; exceeds `max_iterations` only once the budget is spent
    pub iteration: u32,
    pub max_iterations: u32,
    /// Consecutive failures judged equivalent to their predecessor
    pub stuck_count: u32,
    pub strategy_shift_count: u32,
    #[serde(default)]
    pub last_gate: Option<String>,
    #[serde(default)]
    pub last_failure_signature: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RalphState {
    pub fn new(task_id: impl Into<String>, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            iteration: 1,
            max_iterations,
            stuck_count: 0,
            strategy_shift_count: 0,
            last_gate: None,
            last_failure_signature: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.iteration > self.max_iterations
    }
}

/// Reads and writes the state and context files of one working directory
#[derive(Debug, Clone)]
pub struct StateManager {
    state_path: PathBuf,
    context_path: PathBuf,
}

impl StateManager {
    pub fn new(dir: &Path) -> Self {
        Self {
            state_path: dir.join(STATE_FILE),
            context_path: dir.join(CONTEXT_FILE),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn context_path(&self) -> &Path {
        &self.context_path
    }

    /// Start fresh state for `task_id`, discarding context left by an
    /// earlier run.
    pub fn init(&self, task_id: &str, max_iterations: u32) -> RalphResult<RalphState> {
        let state = RalphState::new(task_id, max_iterations);
        self.save(&state)?;
        remove_if_exists(&self.context_path)?;
        debug!(task_id, max_iterations, "Ralph state initialized");
        Ok(state)
    }

    pub fn load(&self) -> RalphResult<RalphState> {
        let json = match std::fs::read_to_string(&self.state_path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RalphError::StateMissing {
                    path: self.state_path.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, state: &RalphState) -> RalphResult<()> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.state_path, json)?;
        Ok(())
    }

    /// Record a gate failure and advance to the next iteration.
    ///
    /// The failure output is appended to the context file, and `stuck_count`
    /// grows when the failure matches the previous one, otherwise resets.
    pub fn record_failure(&self, gate: &str, output: &str) -> RalphResult<RalphState> {
        let mut state = self.load()?;
        let signature = failure_signature(gate, output);

        if state.last_failure_signature.as_deref() == Some(signature.as_str()) {
            state.stuck_count += 1;
        } else {
            state.stuck_count = 0;
        }

        self.append_context(state.iteration, gate, output)?;

        state.last_gate = Some(gate.to_string());
        state.last_failure_signature = Some(signature);
        state.iteration += 1;
        state.updated_at = Utc::now();
        self.save(&state)?;

        debug!(
            gate,
            iteration = state.iteration,
            stuck_count = state.stuck_count,
            "Gate failure recorded"
        );
        Ok(state)
    }

    pub fn increment_strategy_shift(&self) -> RalphResult<RalphState> {
        let mut state = self.load()?;
        state.strategy_shift_count += 1;
        state.updated_at = Utc::now();
        self.save(&state)?;
        Ok(state)
    }

    /// Accumulated failure context; empty before the first failure.
    pub fn context(&self) -> RalphResult<String> {
        match std::fs::read_to_string(&self.context_path) {
            Ok(context) => Ok(context),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete both files. Missing files are not an error.
    pub fn cleanup(&self) -> RalphResult<()> {
        remove_if_exists(&self.state_path)?;
        remove_if_exists(&self.context_path)?;
        Ok(())
    }

    fn append_context(&self, iteration: u32, gate: &str, output: &str) -> RalphResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.context_path)?;
        write!(
            file,
            "### Iteration {iteration}: {gate} gate failed\n\n```\n{}\n```\n\n",
            tail_chars(output.trim_end(), CONTEXT_TAIL_CHARS)
        )?;
        Ok(())
    }
}

/// Removes state and context when dropped, covering early returns and
/// panics between `init` and a normal exit.
#[derive(Debug)]
pub struct StateCleanupGuard {
    manager: StateManager,
}

impl StateCleanupGuard {
    pub fn new(manager: StateManager) -> Self {
        Self { manager }
    }
}

impl Drop for StateCleanupGuard {
    fn drop(&mut self) {
        if let Err(e) = self.manager.cleanup() {
            warn!("Failed to clean up ralph state: {}", e);
        }
    }
}

fn remove_if_exists(path: &Path) -> RalphResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
