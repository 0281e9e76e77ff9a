//! The ralph retry loop
//!
//! Drives one task through implement → tests → (advisory) spec gates until
//! every mandatory gate passes or the iteration budget runs out.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::error::{RalphError, RalphResult};
use super::gates::{bounded_gate, spec_marker_present, HandOff, Implementer, TestGate};
use super::lock::RalphLock;
use super::state::{StateCleanupGuard, StateManager, GATE_IMPLEMENT, GATE_TESTS};
use super::stuck::{is_stuck, STUCK_DIRECTIVE};
use crate::board::{format_board_context, read_board};

/// Loop tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RalphConfig {
    pub max_iterations: u32,
    pub implement_timeout_secs: u64,
    pub test_timeout_secs: u64,
    /// Consecutive equivalent failures before a strategy shift; 0 disables
    pub stuck_threshold: u32,
    pub skip_spec: bool,
    /// Bulletin board directory whose findings are added to each prompt
    pub board_dir: Option<PathBuf>,
    pub board_max_messages: usize,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            implement_timeout_secs: 300,
            test_timeout_secs: 120,
            stuck_threshold: 3,
            skip_spec: false,
            board_dir: None,
            board_max_messages: 20,
        }
    }
}

impl RalphConfig {
    pub fn implement_timeout(&self) -> Duration {
        Duration::from_secs(self.implement_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RalphOutcome {
    pub task_id: String,
    /// Iteration on which every gate passed
    pub iterations: u32,
    pub strategy_shifts: u32,
    /// `None` when the spec gate was skipped
    pub spec_confirmed: Option<bool>,
}

/// Retry loop over one working directory
pub struct RalphLoop {
    working_dir: PathBuf,
    config: RalphConfig,
    implementer: Arc<dyn Implementer>,
    test_gate: Arc<dyn TestGate>,
    hand_off: Arc<dyn HandOff>,
}

impl RalphLoop {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        config: RalphConfig,
        implementer: Arc<dyn Implementer>,
        test_gate: Arc<dyn TestGate>,
        hand_off: Arc<dyn HandOff>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            config,
            implementer,
            test_gate,
            hand_off,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn config(&self) -> &RalphConfig {
        &self.config
    }

    /// Run `task` under a task id derived from the current time.
    pub async fn run(&self, task: &str) -> RalphResult<RalphOutcome> {
        let task_id = format!("ralph-{}", Utc::now().timestamp());
        self.run_with_id(task, &task_id).await
    }

    /// Run `task` to completion or exhaustion.
    ///
    /// Fails with [`RalphError::LockHeld`] before touching anything if
    /// another loop owns the directory. Lock and state files are removed on
    /// every exit path.
    pub async fn run_with_id(&self, task: &str, task_id: &str) -> RalphResult<RalphOutcome> {
        if task.trim().is_empty() {
            return Err(RalphError::validation("task must not be empty"));
        }

        let lock = RalphLock::acquire(&self.working_dir)?;
        let states = StateManager::new(&self.working_dir);
        let cleanup = StateCleanupGuard::new(states.clone());
        states.init(task_id, self.config.max_iterations)?;

        info!(
            task_id,
            max_iterations = self.config.max_iterations,
            dir = %self.working_dir.display(),
            "Ralph loop started"
        );

        let result = self.drive(task, &states).await;
        drop(cleanup);
        lock.release();
        result
    }

    async fn drive(&self, task: &str, states: &StateManager) -> RalphResult<RalphOutcome> {
        loop {
            let state = states.load()?;

            if state.is_exhausted() {
                warn!(
                    task_id = %state.task_id,
                    max_iterations = state.max_iterations,
                    "Maximum iterations reached, handing off failed work"
                );
                match self.hand_off.hand_off(&self.working_dir, &state).await {
                    Ok(location) => info!(location = %location, "Failed work handed off"),
                    Err(e) => warn!("Hand-off failed: {:#}", e),
                }
                return Err(RalphError::MaxIterationsReached {
                    max: state.max_iterations,
                });
            }

            info!(
                iteration = state.iteration,
                max_iterations = state.max_iterations,
                "Ralph iteration"
            );

            let mut directive = None;
            if is_stuck(state.stuck_count, self.config.stuck_threshold) {
                warn!(
                    stuck_count = state.stuck_count,
                    "Stuck pattern detected, forcing strategy shift"
                );
                states.increment_strategy_shift()?;
                directive = Some(STUCK_DIRECTIVE);
            }

            let prompt = self.build_prompt(task, directive, &states.context()?);

            let implement_timeout = self.config.implement_timeout();
            let impl_output = match bounded_gate(
                implement_timeout,
                self.implementer.implement(&prompt, &self.working_dir, implement_timeout),
            )
            .await
            {
                Ok(output) => output,
                Err(failure) => {
                    warn!(iteration = state.iteration, reason = %failure.reason, "Implementation gate failed");
                    states.record_failure(GATE_IMPLEMENT, &failure.details())?;
                    continue;
                }
            };
            info!(iteration = state.iteration, "Implementation gate passed");

            let test_timeout = self.config.test_timeout();
            let test_output = match bounded_gate(
                test_timeout,
                self.test_gate.run_tests(&self.working_dir, test_timeout),
            )
            .await
            {
                Ok(output) => output,
                Err(failure) => {
                    warn!(iteration = state.iteration, reason = %failure.reason, "Tests gate failed");
                    states.record_failure(GATE_TESTS, &failure.details())?;
                    continue;
                }
            };
            info!(iteration = state.iteration, "Tests gate passed");

            let spec_confirmed = if self.config.skip_spec {
                None
            } else {
                let confirmed = spec_marker_present(&[&impl_output, &test_output]);
                if confirmed {
                    info!("Spec compliance confirmed");
                } else {
                    info!("Spec compliance marker not found, continuing");
                }
                Some(confirmed)
            };

            let state = states.load()?;
            info!(
                task_id = %state.task_id,
                iteration = state.iteration,
                "All gates passed, task complete"
            );
            return Ok(RalphOutcome {
                task_id: state.task_id,
                iterations: state.iteration,
                strategy_shifts: state.strategy_shift_count,
                spec_confirmed,
            });
        }
    }

    /// `[directive]` + task + board findings + previous attempt context
    fn build_prompt(&self, task: &str, directive: Option<&str>, context: &str) -> String {
        let mut prompt = match directive {
            Some(directive) => format!("{directive}\n\n{task}"),
            None => task.to_string(),
        };

        if let Some(board) = self.board_context() {
            prompt.push_str("\n\n");
            prompt.push_str(&board);
        }

        if !context.is_empty() {
            prompt.push_str("\n\n## Previous Attempt Context\n");
            prompt.push_str(context);
        }
        prompt
    }

    fn board_context(&self) -> Option<String> {
        let dir = self.config.board_dir.as_ref()?;
        match read_board(dir, self.config.board_max_messages) {
            Ok(entries) if entries.is_empty() => None,
            Ok(entries) => Some(format_board_context(&entries)),
            Err(e) => {
                warn!(dir = %dir.display(), "Failed to read board: {}", e);
                None
            }
        }
    }
}
