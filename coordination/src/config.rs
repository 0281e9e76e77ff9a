//! Conclave configuration
//!
//! Defaults come from environment variables, an optional TOML file replaces
//! whatever it names, and command-line flags win over both.
//!
//! | Variable | Field |
//! |---|---|
//! | `CONCLAVE_STAGE1_TIMEOUT` | `consensus.stage1_timeout_secs` |
//! | `CONCLAVE_STAGE2_TIMEOUT` | `consensus.stage2_timeout_secs` |
//! | `CONCLAVE_CLAUDE_MODEL` | `agents.claude_model` |
//! | `CONCLAVE_GEMINI_MODEL` | `agents.gemini_model` |
//! | `CONCLAVE_CODEX_MODEL` | `agents.codex_model` |
//! | `CONCLAVE_BOARD_DIR` | `ralph.board_dir` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::consensus::ConsensusConfig;
use crate::ralph::RalphConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Models requested from each provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentModels {
    pub claude_model: String,
    pub gemini_model: String,
    pub codex_model: String,
}

impl Default for AgentModels {
    fn default() -> Self {
        Self {
            claude_model: env_string("CONCLAVE_CLAUDE_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            gemini_model: env_string("CONCLAVE_GEMINI_MODEL")
                .unwrap_or_else(|| "gemini-1.5-pro".to_string()),
            codex_model: env_string("CONCLAVE_CODEX_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConclaveConfig {
    pub consensus: ConsensusConfig,
    pub ralph: RalphConfig,
    pub agents: AgentModels,
}

impl Default for ConclaveConfig {
    fn default() -> Self {
        let mut consensus = ConsensusConfig::default();
        if let Some(secs) = env_secs("CONCLAVE_STAGE1_TIMEOUT") {
            consensus.stage1_timeout_secs = secs;
        }
        if let Some(secs) = env_secs("CONCLAVE_STAGE2_TIMEOUT") {
            consensus.stage2_timeout_secs = secs;
        }

        let ralph = RalphConfig {
            board_dir: env_string("CONCLAVE_BOARD_DIR").map(PathBuf::from),
            ..RalphConfig::default()
        };

        Self {
            consensus,
            ralph,
            agents: AgentModels::default(),
        }
    }
}

impl ConclaveConfig {
    /// Environment defaults
    pub fn load() -> Self {
        Self::default()
    }

    /// Load from a TOML file; sections or keys the file omits keep their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        if config.ralph.board_dir.is_none() {
            config.ralph.board_dir = env_string("CONCLAVE_BOARD_DIR").map(PathBuf::from);
        }
        Ok(config)
    }

    /// File config when a path is given, environment defaults otherwise
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::load()),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(key: &str) -> Option<u64> {
    let raw = env_string(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid timeout override");
            None
        }
    }
}
