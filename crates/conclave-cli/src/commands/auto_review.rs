//! `conclave auto-review`: code review with SHAs detected from git

use anyhow::{Context, Result};
use clap::Args;
use coordination::config::ConclaveConfig;
use coordination::git::GitManager;
use std::path::PathBuf;
use tracing::info;

use super::consensus::{self, ConsensusArgs, ConsensusMode};

#[derive(Args, Debug, Clone)]
pub struct AutoReviewArgs {
    /// Change description
    #[arg(required = true, num_args = 1..)]
    pub description: Vec<String>,

    /// Override base SHA (default: merge base with origin/main, main, origin/master or master)
    #[arg(long)]
    pub base_sha: Option<String>,

    /// Override head SHA (default: HEAD)
    #[arg(long)]
    pub head_sha: Option<String>,

    /// Implementation plan to review against
    #[arg(long)]
    pub plan_file: Option<PathBuf>,
}

impl AutoReviewArgs {
    pub fn description(&self) -> String {
        self.description.join(" ")
    }

    /// Explicit SHAs win; otherwise HEAD and its merge base with the default
    /// branch.
    pub fn resolve_shas(&self, git: &GitManager) -> Result<(String, String)> {
        let head = match &self.head_sha {
            Some(sha) => sha.clone(),
            None => git.rev_parse("HEAD").context("Failed to get HEAD")?,
        };
        let base = match &self.base_sha {
            Some(sha) => sha.clone(),
            None => git
                .default_merge_base(&head)
                .context("Could not determine base SHA")?,
        };
        Ok((base, head))
    }

    pub fn to_consensus_args(&self, base_sha: String, head_sha: String) -> ConsensusArgs {
        ConsensusArgs {
            mode: ConsensusMode::CodeReview,
            base_sha: Some(base_sha),
            head_sha: Some(head_sha),
            description: Some(self.description()),
            plan_file: self.plan_file.clone(),
            prompt: None,
            context: None,
            stage1_timeout: None,
            stage2_timeout: None,
            dry_run: false,
        }
    }
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}

pub async fn run(args: AutoReviewArgs, config: &ConclaveConfig) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let (base, head) = args.resolve_shas(&GitManager::new(&cwd))?;
    info!(base = short(&base), head = short(&head), "Auto-review");

    consensus::run(args.to_consensus_args(base, head), config).await
}
