//! `conclave consensus`

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use coordination::config::ConclaveConfig;
use coordination::consensus::{
    build_code_review_chairman_prompt, build_code_review_prompt, build_general_chairman_prompt,
    build_general_prompt, run_consensus_with_builder, AgentResult, ConsensusConfig,
    ConsensusError, ConsensusResult, SharedAgent,
};
use coordination::git::GitManager;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::agents::default_agents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsensusMode {
    CodeReview,
    GeneralPrompt,
}

impl ConsensusMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeReview => "code-review",
            Self::GeneralPrompt => "general-prompt",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConsensusArgs {
    #[arg(long, value_enum)]
    pub mode: ConsensusMode,

    /// Base commit SHA (code-review mode)
    #[arg(long)]
    pub base_sha: Option<String>,

    /// Head commit SHA (code-review mode)
    #[arg(long)]
    pub head_sha: Option<String>,

    /// Change description (code-review mode)
    #[arg(long)]
    pub description: Option<String>,

    /// Implementation plan to review against
    #[arg(long)]
    pub plan_file: Option<PathBuf>,

    /// Question to analyze (general-prompt mode)
    #[arg(long)]
    pub prompt: Option<String>,

    /// Additional context (general-prompt mode)
    #[arg(long)]
    pub context: Option<String>,

    /// Stage 1 timeout in seconds
    #[arg(long)]
    pub stage1_timeout: Option<u64>,

    /// Stage 2 timeout in seconds
    #[arg(long)]
    pub stage2_timeout: Option<u64>,

    /// Validate arguments only
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

/// Validated consensus request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusRequest {
    CodeReview {
        base_sha: String,
        head_sha: String,
        description: String,
        plan_file: Option<PathBuf>,
    },
    General {
        prompt: String,
        context: String,
    },
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl ConsensusArgs {
    /// Check the mode-specific required flags before anything runs.
    pub fn validate(&self) -> Result<ConsensusRequest> {
        match self.mode {
            ConsensusMode::CodeReview => {
                let (Some(base_sha), Some(head_sha), Some(description)) = (
                    non_empty(&self.base_sha),
                    non_empty(&self.head_sha),
                    non_empty(&self.description),
                ) else {
                    bail!("code-review mode requires --base-sha, --head-sha, --description");
                };
                Ok(ConsensusRequest::CodeReview {
                    base_sha,
                    head_sha,
                    description,
                    plan_file: self.plan_file.clone(),
                })
            }
            ConsensusMode::GeneralPrompt => {
                let Some(prompt) = non_empty(&self.prompt) else {
                    bail!("general-prompt mode requires --prompt");
                };
                Ok(ConsensusRequest::General {
                    prompt,
                    context: self.context.clone().unwrap_or_default(),
                })
            }
        }
    }

    /// Deadlines from the config, overridden by positive flag values.
    pub fn consensus_config(&self, base: &ConsensusConfig) -> ConsensusConfig {
        let mut config = base.clone();
        if let Some(secs) = self.stage1_timeout.filter(|s| *s > 0) {
            config.stage1_timeout_secs = secs;
        }
        if let Some(secs) = self.stage2_timeout.filter(|s| *s > 0) {
            config.stage2_timeout_secs = secs;
        }
        config
    }
}

pub fn dry_run_summary(mode: ConsensusMode, request: &ConsensusRequest) -> String {
    let mut summary = format!("Dry run: Arguments validated successfully\nMode: {}\n", mode.as_str());
    match request {
        ConsensusRequest::CodeReview {
            base_sha,
            head_sha,
            description,
            ..
        } => {
            summary.push_str(&format!(
                "Base SHA: {}\nHead SHA: {}\nDescription: {}\n",
                base_sha, head_sha, description
            ));
        }
        ConsensusRequest::General { prompt, .. } => {
            summary.push_str(&format!("Prompt: {}\n", prompt));
        }
    }
    summary
}

/// Stage 1 prompt plus what the chairman prompt is built from
#[derive(Debug, Clone)]
pub struct PreparedPrompts {
    pub stage1_prompt: String,
    chairman: ChairmanInput,
}

#[derive(Debug, Clone)]
enum ChairmanInput {
    CodeReview {
        description: String,
        modified_files: String,
    },
    General {
        question: String,
    },
}

impl PreparedPrompts {
    pub fn chairman_prompt(&self, results: &[AgentResult]) -> String {
        match &self.chairman {
            ChairmanInput::CodeReview {
                description,
                modified_files,
            } => build_code_review_chairman_prompt(description, modified_files, results),
            ChairmanInput::General { question } => build_general_chairman_prompt(question, results),
        }
    }
}

/// Build the prompts, reading the diff from `git` for code reviews.
pub fn prepare(request: &ConsensusRequest, git: &GitManager) -> Result<PreparedPrompts> {
    match request {
        ConsensusRequest::CodeReview {
            base_sha,
            head_sha,
            description,
            plan_file,
        } => {
            let diff = git
                .diff(base_sha, head_sha)
                .context("Failed to read git diff")?;
            let modified_files: String = git
                .diff_name_only(base_sha, head_sha)
                .unwrap_or_default()
                .iter()
                .map(|f| format!("{f}\n"))
                .collect();
            let plan = match plan_file {
                Some(path) => read_plan(path)?,
                None => String::new(),
            };

            Ok(PreparedPrompts {
                stage1_prompt: build_code_review_prompt(description, &diff, &modified_files, &plan),
                chairman: ChairmanInput::CodeReview {
                    description: description.clone(),
                    modified_files,
                },
            })
        }
        ConsensusRequest::General { prompt, context } => Ok(PreparedPrompts {
            stage1_prompt: build_general_prompt(prompt, context),
            chairman: ChairmanInput::General {
                question: prompt.clone(),
            },
        }),
    }
}

fn read_plan(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))
}

/// Every agent analyzes; the same list, in order, provides the chairmen.
pub async fn execute(
    agents: &[SharedAgent],
    prompts: &PreparedPrompts,
    config: &ConsensusConfig,
) -> Result<ConsensusResult, ConsensusError> {
    run_consensus_with_builder(
        agents,
        agents,
        &prompts.stage1_prompt,
        |results| prompts.chairman_prompt(results),
        config,
    )
    .await
}

/// Save the detailed markdown report to the temp directory.
pub fn write_report(result: &ConsensusResult, mode: ConsensusMode) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!(
        "consensus-{}-{}.md",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        std::process::id()
    ));
    std::fs::write(&path, result.to_markdown(mode.as_str()))
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(path)
}

pub async fn run(args: ConsensusArgs, config: &ConclaveConfig) -> Result<()> {
    let request = args.validate()?;
    let consensus_config = args.consensus_config(&config.consensus);

    if args.dry_run {
        print!("{}", dry_run_summary(args.mode, &request));
        return Ok(());
    }

    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let prompts = prepare(&request, &GitManager::new(&cwd))?;
    let agents = default_agents(&config.agents);

    let result = execute(&agents, &prompts, &consensus_config).await?;
    let report = write_report(&result, args.mode)?;

    info!(
        chairman = %result.chairman_name,
        agents_succeeded = result.agents_succeeded,
        "Consensus complete"
    );
    println!("{}", result.chairman_output);
    info!(report = %report.display(), "Detailed breakdown saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coordination::consensus::{Agent, AgentError};
    use std::process::Command;
    use std::sync::Arc;

    fn args(mode: ConsensusMode) -> ConsensusArgs {
        ConsensusArgs {
            mode,
            base_sha: None,
            head_sha: None,
            description: None,
            plan_file: None,
            prompt: None,
            context: None,
            stage1_timeout: None,
            stage2_timeout: None,
            dry_run: false,
        }
    }

    struct Echo(&'static str);

    #[async_trait]
    impl Agent for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn available(&self) -> bool {
            true
        }

        async fn run(&self, prompt: &str) -> Result<String, AgentError> {
            Ok(format!("{} saw {} bytes", self.0, prompt.len()))
        }
    }

    #[test]
    fn test_code_review_requires_shas_and_description() {
        let mut a = args(ConsensusMode::CodeReview);
        a.base_sha = Some("abc".into());
        a.head_sha = Some("def".into());
        let err = a.validate().unwrap_err();
        assert!(err.to_string().contains("--description"));

        a.description = Some("Add caching".into());
        assert_eq!(
            a.validate().unwrap(),
            ConsensusRequest::CodeReview {
                base_sha: "abc".into(),
                head_sha: "def".into(),
                description: "Add caching".into(),
                plan_file: None,
            }
        );
    }

    #[test]
    fn test_general_requires_prompt() {
        let mut a = args(ConsensusMode::GeneralPrompt);
        a.prompt = Some("   ".into());
        assert!(a.validate().is_err());

        a.prompt = Some("Which queue?".into());
        a.context = Some("We use tokio".into());
        let request = a.validate().unwrap();
        let summary = dry_run_summary(a.mode, &request);
        assert!(summary.contains("Mode: general-prompt"));
        assert!(summary.contains("Prompt: Which queue?"));
    }

    #[test]
    fn test_flag_timeouts_override_config() {
        let mut a = args(ConsensusMode::GeneralPrompt);
        a.stage1_timeout = Some(15);
        a.stage2_timeout = Some(0);
        let config = a.consensus_config(&ConsensusConfig::default());
        assert_eq!(config.stage1_timeout_secs, 15);
        assert_eq!(config.stage2_timeout_secs, 60);
    }

    #[test]
    fn test_prepare_code_review_from_git() {
        let dir = tempfile::tempdir().unwrap();
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@conclave.dev"],
            vec!["config", "user.name", "Conclave Test"],
            vec!["commit", "--allow-empty", "-m", "base"],
        ] {
            Command::new("git").args(&args).current_dir(dir.path()).output().unwrap();
        }
        let git = GitManager::new(dir.path());
        let base = git.rev_parse("HEAD").unwrap();
        std::fs::write(dir.path().join("cache.rs"), "pub struct Cache;\n").unwrap();
        git.commit_all("add cache").unwrap();
        let head = git.rev_parse("HEAD").unwrap();

        let plan = dir.path().join("plan.md");
        std::fs::write(&plan, "1. Add a cache struct").unwrap();

        let request = ConsensusRequest::CodeReview {
            base_sha: base,
            head_sha: head,
            description: "Add caching".into(),
            plan_file: Some(plan),
        };
        let prompts = prepare(&request, &git).unwrap();
        assert!(prompts.stage1_prompt.contains("+pub struct Cache;"));
        assert!(prompts.stage1_prompt.contains("1. Add a cache struct"));
        assert!(prompts.stage1_prompt.contains("cache.rs"));

        let chairman = prompts.chairman_prompt(&[AgentResult::success("A", "fine")]);
        assert!(chairman.contains("Add caching"));
        assert!(chairman.contains("cache.rs"));
    }

    #[test]
    fn test_missing_plan_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_plan(&dir.path().join("nope.md")).unwrap_err();
        assert!(err.to_string().contains("nope.md"));
    }

    #[tokio::test]
    async fn test_execute_and_report() {
        let request = ConsensusRequest::General {
            prompt: "Pick a name".into(),
            context: String::new(),
        };
        let prompts = prepare(&request, &GitManager::new(".")).unwrap();
        let agents: Vec<SharedAgent> = vec![Arc::new(Echo("One")), Arc::new(Echo("Two"))];

        let result = execute(&agents, &prompts, &ConsensusConfig::default())
            .await
            .unwrap();
        assert_eq!(result.agents_succeeded, 2);
        assert_eq!(result.chairman_name, "One");

        let path = write_report(&result, ConsensusMode::GeneralPrompt).unwrap();
        let report = std::fs::read_to_string(&path).unwrap();
        assert!(report.contains("general-prompt"));
        assert!(report.contains(&result.chairman_output));
        std::fs::remove_file(path).unwrap();
    }
}
