//! `conclave ralph-run`

use anyhow::{bail, Context, Result};
use clap::Args;
use coordination::config::ConclaveConfig;
use coordination::ralph::{
    CommandImplementer, CommandTestGate, GitBranchHandOff, RalphConfig, RalphLoop,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct RalphRunArgs {
    /// Task description, or a file containing it
    #[arg(long)]
    pub task: String,

    /// Maximum retry iterations
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Implementation gate timeout (seconds)
    #[arg(long)]
    pub implement_timeout: Option<u64>,

    /// Test gate timeout (seconds)
    #[arg(long)]
    pub test_timeout: Option<u64>,

    /// Consecutive same-error count before a strategy shift
    #[arg(long)]
    pub stuck_threshold: Option<u32>,

    /// Skip the spec compliance gate
    #[arg(long, default_value_t = false)]
    pub skip_spec: bool,

    /// Bulletin board directory to read peer findings from
    #[arg(long)]
    pub board_dir: Option<PathBuf>,
}

impl RalphRunArgs {
    /// Flags layered over the configured loop settings
    pub fn apply(&self, base: &RalphConfig) -> RalphConfig {
        let mut config = base.clone();
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(secs) = self.implement_timeout {
            config.implement_timeout_secs = secs;
        }
        if let Some(secs) = self.test_timeout {
            config.test_timeout_secs = secs;
        }
        if let Some(n) = self.stuck_threshold {
            config.stuck_threshold = n;
        }
        if self.skip_spec {
            config.skip_spec = true;
        }
        if let Some(dir) = &self.board_dir {
            config.board_dir = Some(dir.clone());
        }
        config
    }
}

/// The task text: file contents when `task` names a file, else `task`.
pub fn resolve_task(task: &str) -> Result<String> {
    let path = Path::new(task);
    let text = if path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file {}", path.display()))?
    } else {
        task.to_string()
    };

    if text.trim().is_empty() {
        bail!("--task is required");
    }
    Ok(text)
}

pub async fn run(args: RalphRunArgs, config: &ConclaveConfig) -> Result<()> {
    let task = resolve_task(&args.task)?;
    let ralph_config = args.apply(&config.ralph);
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;

    let ralph = RalphLoop::new(
        cwd,
        ralph_config,
        Arc::new(CommandImplementer::default()),
        Arc::new(CommandTestGate::detect()),
        Arc::new(GitBranchHandOff),
    );

    let outcome = ralph.run(&task).await?;
    info!(
        task_id = %outcome.task_id,
        iterations = outcome.iterations,
        strategy_shifts = outcome.strategy_shifts,
        "All gates passed, task complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(task: &str) -> RalphRunArgs {
        RalphRunArgs {
            task: task.to_string(),
            max_iterations: None,
            implement_timeout: None,
            test_timeout: None,
            stuck_threshold: None,
            skip_spec: false,
            board_dir: None,
        }
    }

    #[test]
    fn test_task_from_text_or_file() {
        assert_eq!(resolve_task("Fix the parser").unwrap(), "Fix the parser");

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("TASK.md");
        std::fs::write(&file, "# Task\nMake it fast").unwrap();
        assert_eq!(
            resolve_task(file.to_str().unwrap()).unwrap(),
            "# Task\nMake it fast"
        );
    }

    #[test]
    fn test_empty_task_rejected() {
        assert!(resolve_task("  ").is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.md");
        std::fs::write(&file, "\n").unwrap();
        assert!(resolve_task(file.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let mut args = run_args("t");
        args.max_iterations = Some(8);
        args.test_timeout = Some(30);
        args.skip_spec = true;
        args.board_dir = Some(PathBuf::from("/tmp/board"));

        let config = args.apply(&RalphConfig::default());
        assert_eq!(config.max_iterations, 8);
        assert_eq!(config.test_timeout_secs, 30);
        assert_eq!(config.implement_timeout_secs, 300);
        assert_eq!(config.stuck_threshold, 3);
        assert!(config.skip_spec);
        assert_eq!(config.board_dir, Some(PathBuf::from("/tmp/board")));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let base = RalphConfig {
            max_iterations: 2,
            skip_spec: true,
            ..RalphConfig::default()
        };
        assert_eq!(run_args("t").apply(&base), base);
    }
}
