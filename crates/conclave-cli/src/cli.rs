use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::auto_review::AutoReviewArgs;
use crate::commands::consensus::ConsensusArgs;
use crate::commands::ralph_run::RalphRunArgs;

/// Multi-agent consensus and autonomous retry loops for coding tasks
#[derive(Parser, Debug)]
#[command(name = "conclave", author, version, about, long_about = None)]
pub struct Cli {
    /// TOML config file; environment defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Two-stage consensus: parallel agent analysis, then chairman synthesis
    Consensus(ConsensusArgs),
    /// Detect base/head SHAs from git history and run a consensus code review
    AutoReview(AutoReviewArgs),
    /// Run a task through implement/test/spec gates with retries and stuck detection
    RalphRun(RalphRunArgs),
}
