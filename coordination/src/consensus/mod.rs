//! Multi-agent consensus
//!
//! Fans one prompt out to every available [`Agent`], then asks a chairman
//! (chosen by ordered fallback) to synthesize the successful analyses into a
//! single answer. Retrying a failed run is the caller's decision.

pub mod agent;
pub mod orchestrator;
pub mod prompts;

pub use agent::{Agent, AgentError, AgentResult};
pub use orchestrator::{
    run_consensus, run_consensus_with_builder, run_stage1, run_stage2, ConsensusConfig,
    ConsensusError, ConsensusResult, ConsensusStage, SharedAgent,
};
pub use prompts::{
    build_chairman_prompt, build_code_review_chairman_prompt, build_code_review_prompt,
    build_general_chairman_prompt, build_general_prompt,
};
