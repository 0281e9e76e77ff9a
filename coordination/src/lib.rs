//! Conclave coordination library
//!
//! Coordinates independent, unreliable AI agents into a single answer and
//! drives tasks through a bounded, self-correcting retry loop.
//!
//! # Modules
//!
//! - [`events`]: in-process envelope bus with hierarchical topics and
//!   drop-on-full backpressure
//! - [`board`]: file-backed bulletin board of cross-task findings, read back
//!   as prompt context
//! - [`consensus`]: two-stage fan-out/fan-in orchestrator with per-stage
//!   deadlines and ordered chairman fallback
//! - [`ralph`]: retry loop with gates, stuck detection and a directory lock
//! - [`git`]: git plumbing used for review prompts and failed-work hand-off
//! - [`config`]: environment and TOML configuration
//!
//! # Usage
//!
//! ```bash
//! # General question answered by every configured agent
//! conclave consensus --mode general-prompt --prompt "Is this design sound?"
//!
//! # Review the current branch against its merge base
//! conclave auto-review "Add retry to the HTTP client"
//!
//! # Retry a task until tests pass
//! conclave ralph-run --task TASK.md --max-iterations 5
//! ```

pub mod board;
pub mod config;
pub mod consensus;
pub mod events;
pub mod git;
pub mod ralph;

pub use board::{format_board_context, read_board, spawn_board_recorder, BoardError, BoardWriter};
pub use config::{AgentModels, ConclaveConfig, ConfigError};
pub use consensus::{
    run_consensus, run_consensus_with_builder, Agent, AgentError, AgentResult, ConsensusConfig,
    ConsensusError, ConsensusResult, SharedAgent,
};
pub use events::{
    topic_match, Bus, ChannelBus, Envelope, EnvelopeFactory, EventBusError, Message, SharedBus,
};
pub use git::{GitError, GitManager};
pub use ralph::{
    RalphConfig, RalphError, RalphLock, RalphLoop, RalphOutcome, RalphResult, RalphState,
    StateManager,
};
