//! Two-stage consensus: parallel analysis, then chairman synthesis
//!
//! ```text
//! Idle ──▶ Stage1 (all available agents, one shared deadline, barrier)
//!            │
//!            ▼
//!          Tally ── 0 succeeded ──▶ Failed (AllAgentsFailed)
//!            │
//!            ▼
//!          Stage2 (chairmen in priority order, own deadline, first non-empty wins)
//!            │
//!            ├── none accepted ──▶ Failed (AllChairmenFailed)
//!            ▼
//!          Done
//! ```

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use super::agent::{Agent, AgentError, AgentResult};
use super::prompts::build_chairman_prompt;

/// Fatal consensus failures. Per-agent failures are not errors; they are
/// reported in [`ConsensusResult::stage1_results`].
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("No agents available (need at least 1 API key)")]
    NoAgentsAvailable,

    #[error("All agents failed (0/{attempted} succeeded)")]
    AllAgentsFailed { attempted: usize },

    #[error("Stage 2 failed: all chairman agents failed ({attempted} tried)")]
    AllChairmenFailed { attempted: usize },
}

/// Consensus state machine stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStage {
    Idle,
    Stage1,
    Tally,
    Stage2,
    Done,
    Failed,
}

impl std::fmt::Display for ConsensusStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Stage1 => write!(f, "stage1"),
            Self::Tally => write!(f, "tally"),
            Self::Stage2 => write!(f, "stage2"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Per-stage deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Shared deadline for the parallel analysis stage (seconds)
    pub stage1_timeout_secs: u64,
    /// Deadline for the whole chairman fallback stage (seconds)
    pub stage2_timeout_secs: u64,
}

impl ConsensusConfig {
    pub fn stage1_timeout(&self) -> Duration {
        Duration::from_secs(self.stage1_timeout_secs)
    }

    pub fn stage2_timeout(&self) -> Duration {
        Duration::from_secs(self.stage2_timeout_secs)
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            stage1_timeout_secs: 60,
            stage2_timeout_secs: 60,
        }
    }
}

/// Result of a completed consensus run
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    /// One entry per available agent, in agent-list order
    pub stage1_results: Vec<AgentResult>,
    pub chairman_name: String,
    pub chairman_output: String,
    pub agents_succeeded: usize,
}

impl ConsensusResult {
    /// Detailed markdown breakdown of both stages.
    pub fn to_markdown(&self, mode: &str) -> String {
        let mut out = format!(
            "# Multi-Agent Consensus Analysis\n\n\
             **Mode:** {}\n**Date:** {}\n**Agents Succeeded:** {}/{}\n**Chairman:** {}\n\n---\n\n",
            mode,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            self.agents_succeeded,
            self.stage1_results.len(),
            self.chairman_name,
        );
        out.push_str(&format!(
            "## Stage 2: Chairman Consensus (by {})\n\n{}\n\n---\n\n## Stage 1: Individual Analyses\n\n",
            self.chairman_name, self.chairman_output
        ));
        for result in &self.stage1_results {
            match &result.error {
                None => out.push_str(&format!(
                    "### {}\n\n{}\n\n",
                    result.agent_name, result.output
                )),
                Some(e) => out.push_str(&format!(
                    "### {}\n\n_Failed: {}_\n\n",
                    result.agent_name, e
                )),
            }
        }
        out
    }
}

/// Shared, type-erased agent handle
pub type SharedAgent = Arc<dyn Agent>;

async fn run_bounded(
    agent: &dyn Agent,
    prompt: &str,
    deadline: tokio::time::Instant,
    budget: Duration,
) -> AgentResult {
    match tokio::time::timeout_at(deadline, agent.run(prompt)).await {
        Ok(Ok(output)) => AgentResult::success(agent.name(), output),
        Ok(Err(e)) => AgentResult::failure(agent.name(), e),
        Err(_) => AgentResult::failure(agent.name(), AgentError::Timeout(budget)),
    }
}

/// Run every agent concurrently with the same prompt under one deadline.
///
/// Waits for every invocation to finish or hit the deadline. Results keep the
/// order of `agents`, not completion order.
pub async fn run_stage1(
    agents: &[SharedAgent],
    prompt: &str,
    timeout: Duration,
) -> Vec<AgentResult> {
    let deadline = tokio::time::Instant::now() + timeout;
    join_all(
        agents
            .iter()
            .map(|agent| run_bounded(agent.as_ref(), prompt, deadline, timeout)),
    )
    .await
}

/// Try chairmen in priority order until one returns non-empty output.
///
/// Any non-empty output is accepted, whitespace included; only a
/// zero-length answer moves on to the next chairman. Unavailable
/// candidates are skipped. All candidates share one deadline.
pub async fn run_stage2(
    chairmen: &[SharedAgent],
    prompt: &str,
    timeout: Duration,
) -> Result<AgentResult, ConsensusError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempted = 0;

    for chairman in chairmen {
        if !chairman.available() {
            continue;
        }
        attempted += 1;

        let result = run_bounded(chairman.as_ref(), prompt, deadline, timeout).await;
        match &result.error {
            None if !result.output.is_empty() => return Ok(result),
            None => warn!(chairman = %result.agent_name, "Chairman returned empty output"),
            Some(e) => warn!(chairman = %result.agent_name, "Chairman failed: {}", e),
        }
    }

    Err(ConsensusError::AllChairmenFailed { attempted })
}

/// Run both stages with the default chairman prompt.
pub async fn run_consensus(
    agents: &[SharedAgent],
    chairmen: &[SharedAgent],
    prompt: &str,
    config: &ConsensusConfig,
) -> Result<ConsensusResult, ConsensusError> {
    run_consensus_with_builder(
        agents,
        chairmen,
        prompt,
        |results| build_chairman_prompt(prompt, results),
        config,
    )
    .await
}

/// Run both stages, building the chairman prompt from the Stage 1 results.
pub async fn run_consensus_with_builder<F>(
    agents: &[SharedAgent],
    chairmen: &[SharedAgent],
    stage1_prompt: &str,
    build_chairman: F,
    config: &ConsensusConfig,
) -> Result<ConsensusResult, ConsensusError>
where
    F: FnOnce(&[AgentResult]) -> String,
{
    let mut stage = ConsensusStage::Idle;
    let mut advance = |next: ConsensusStage| {
        info!(from = %stage, to = %next, "Consensus stage transition");
        stage = next;
    };

    let available: Vec<SharedAgent> = agents
        .iter()
        .filter(|a| a.available())
        .cloned()
        .collect();
    if available.is_empty() {
        advance(ConsensusStage::Failed);
        return Err(ConsensusError::NoAgentsAvailable);
    }

    advance(ConsensusStage::Stage1);
    info!(
        agents = available.len(),
        timeout_secs = config.stage1_timeout_secs,
        "Launching parallel agent analysis"
    );
    let start = Instant::now();
    let results = run_stage1(&available, stage1_prompt, config.stage1_timeout()).await;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Stage 1 complete");

    advance(ConsensusStage::Tally);
    for r in &results {
        match &r.error {
            None => info!(agent = %r.agent_name, "Agent succeeded"),
            Some(e) => warn!(
                agent = %r.agent_name,
                timeout = e.is_timeout(),
                "Agent failed: {}",
                e
            ),
        }
    }
    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    info!(succeeded, total = results.len(), "Agents completed");
    if succeeded == 0 {
        advance(ConsensusStage::Failed);
        return Err(ConsensusError::AllAgentsFailed {
            attempted: results.len(),
        });
    }

    advance(ConsensusStage::Stage2);
    let chairman_prompt = build_chairman(&results);
    let start = Instant::now();
    let chairman = match run_stage2(chairmen, &chairman_prompt, config.stage2_timeout()).await {
        Ok(chairman) => chairman,
        Err(e) => {
            advance(ConsensusStage::Failed);
            return Err(e);
        }
    };
    info!(
        chairman = %chairman.agent_name,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Chairman synthesis complete"
    );

    advance(ConsensusStage::Done);
    Ok(ConsensusResult {
        stage1_results: results,
        chairman_name: chairman.agent_name,
        chairman_output: chairman.output,
        agents_succeeded: succeeded,
    })
}
