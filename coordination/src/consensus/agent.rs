//! Agent capability and per-call outcomes

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Why a single agent invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API key not configured for {0}")]
    MissingApiKey(String),

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// An external analysis agent.
///
/// Implementations do not enforce deadlines themselves: the orchestrator
/// bounds every `run` and drops the future when the deadline passes, so
/// agents must be cancel-safe at await points.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable display name, used to label outputs.
    fn name(&self) -> &str;

    /// Whether this agent can be invoked (credentials present, binary found).
    fn available(&self) -> bool;

    /// Produce an analysis for `prompt`.
    async fn run(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub output: String,
    pub error: Option<AgentError>,
}

impl AgentResult {
    pub fn success(agent_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(agent_name: impl Into<String>, error: AgentError) -> Self {
        Self {
            agent_name: agent_name.into(),
            output: String::new(),
            error: Some(error),
        }
    }

    /// Success strictly means no error, regardless of output.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
