//! Consensus integration tests
//!
//! Drives the full two-stage flow with scripted agents:
//! - Code review over a real git diff, chairman sees every review
//! - Chairman fallback down the priority list
//! - Stage deadlines are independent of each other
//! - Fatal outcomes never produce a partial result

use async_trait::async_trait;
use coordination::consensus::{
    build_code_review_chairman_prompt, build_code_review_prompt, run_consensus,
    run_consensus_with_builder, Agent, AgentError, ConsensusConfig, ConsensusError, SharedAgent,
};
use coordination::git::GitManager;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Agent that sleeps, then answers or fails, and keeps every prompt it saw.
struct FakeAgent {
    name: String,
    available: bool,
    delay: Duration,
    reply: Result<String, AgentError>,
    seen: Mutex<Vec<String>>,
}

impl FakeAgent {
    fn answering(name: &str, reply: &str) -> Arc<Self> {
        Self::build(name, true, Duration::ZERO, Ok(reply.to_string()))
    }

    fn failing(name: &str, message: &str) -> Arc<Self> {
        Self::build(
            name,
            true,
            Duration::ZERO,
            Err(AgentError::RequestFailed(message.to_string())),
        )
    }

    fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Self::build(name, true, delay, Ok(format!("{name} finally answered")))
    }

    fn unavailable(name: &str) -> Arc<Self> {
        Self::build(name, false, Duration::ZERO, Ok("never".to_string()))
    }

    fn build(
        name: &str,
        available: bool,
        delay: Duration,
        reply: Result<String, AgentError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            available,
            delay,
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for FakeAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        self.seen.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

fn config(stage1_secs: u64, stage2_secs: u64) -> ConsensusConfig {
    ConsensusConfig {
        stage1_timeout_secs: stage1_secs,
        stage2_timeout_secs: stage2_secs,
    }
}

fn git(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(status.status.success(), "git {:?} failed", args);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_code_review_over_git_diff() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-b", "main"]);
    git(dir.path(), &["config", "user.email", "test@conclave.dev"]);
    git(dir.path(), &["config", "user.name", "Conclave Test"]);
    std::fs::write(dir.path().join("lib.rs"), "fn add(a: i32, b: i32) -> i32 { a + b }\n").unwrap();
    git(dir.path(), &["add", "-A"]);
    git(dir.path(), &["commit", "-m", "base"]);
    std::fs::write(dir.path().join("lib.rs"), "fn add(a: i32, b: i32) -> i32 { a - b }\n").unwrap();
    git(dir.path(), &["commit", "-am", "change"]);

    let repo = GitManager::new(dir.path());
    let head = repo.rev_parse("HEAD").unwrap();
    let base = repo.rev_parse("HEAD~1").unwrap();
    let diff = repo.diff(&base, &head).unwrap();
    let files = repo.diff_name_only(&base, &head).unwrap().join("\n");

    let description = "Tweak add";
    let prompt = build_code_review_prompt(description, &diff, &files, "");
    assert!(prompt.contains("-fn add(a: i32, b: i32) -> i32 { a + b }"));

    let claude = FakeAgent::answering("Claude", "Critical: add now subtracts");
    let gemini = FakeAgent::answering("Gemini", "Important: sign flipped in lib.rs");
    let codex = FakeAgent::failing("Codex", "rate limited");
    let agents: Vec<SharedAgent> = vec![claude.clone(), gemini.clone(), codex.clone()];

    let result = run_consensus_with_builder(
        &agents,
        &agents,
        &prompt,
        |results| build_code_review_chairman_prompt(description, &files, results),
        &ConsensusConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.agents_succeeded, 2);
    assert_eq!(result.chairman_name, "Claude");
    assert_eq!(result.stage1_results.len(), 3);
    assert!(result.stage1_results[2].error.is_some());

    let chairman_prompt = &claude.prompts()[1];
    assert!(chairman_prompt.contains("2 of 3 reviewers"));
    assert!(chairman_prompt.contains("add now subtracts"));
    assert!(chairman_prompt.contains("sign flipped"));
    assert!(chairman_prompt.contains("lib.rs"));
}

#[tokio::test]
async fn test_chairman_fallback_order() {
    init_tracing();
    let first = FakeAgent::failing("First", "overloaded");
    let skipped = FakeAgent::unavailable("Skipped");
    let second = FakeAgent::answering("Second", "synthesis");
    let agents: Vec<SharedAgent> = vec![FakeAgent::answering("Worker", "analysis")];
    let chairmen: Vec<SharedAgent> = vec![first.clone(), skipped.clone(), second.clone()];

    let result = run_consensus(&agents, &chairmen, "question", &ConsensusConfig::default())
        .await
        .unwrap();

    assert_eq!(result.chairman_name, "Second");
    assert_eq!(result.chairman_output, "synthesis");
    assert_eq!(first.prompts().len(), 1);
    assert!(skipped.prompts().is_empty());
}

#[tokio::test]
async fn test_slow_stage1_does_not_consume_stage2_budget() {
    init_tracing();
    let slow = FakeAgent::slow("Slow", Duration::from_secs(30));
    let fast = FakeAgent::answering("Fast", "quick analysis");
    let chairman = FakeAgent::answering("Chair", "final");
    let agents: Vec<SharedAgent> = vec![slow.clone(), fast.clone()];
    let chairmen: Vec<SharedAgent> = vec![chairman.clone()];

    let started = std::time::Instant::now();
    let result = run_consensus(&agents, &chairmen, "q", &config(1, 1))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.agents_succeeded, 1);
    assert!(result.stage1_results[0]
        .error
        .as_ref()
        .is_some_and(AgentError::is_timeout));
    assert_eq!(result.chairman_output, "final");
}

#[tokio::test]
async fn test_all_agents_failed_is_fatal() {
    init_tracing();
    let agents: Vec<SharedAgent> = vec![
        FakeAgent::failing("A", "down"),
        FakeAgent::failing("B", "down"),
    ];
    let chairman = FakeAgent::answering("Chair", "never used");
    let chairmen: Vec<SharedAgent> = vec![chairman.clone()];

    let err = run_consensus(&agents, &chairmen, "q", &ConsensusConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsensusError::AllAgentsFailed { .. }));
    assert!(chairman.prompts().is_empty());
}

#[tokio::test]
async fn test_no_available_agents_is_fatal() {
    init_tracing();
    let agents: Vec<SharedAgent> = vec![FakeAgent::unavailable("A"), FakeAgent::unavailable("B")];
    let err = run_consensus(&agents, &agents, "q", &ConsensusConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsensusError::NoAgentsAvailable));
}

#[tokio::test]
async fn test_all_chairmen_failed_is_fatal() {
    init_tracing();
    let agents: Vec<SharedAgent> = vec![FakeAgent::answering("A", "analysis")];
    let chairmen: Vec<SharedAgent> = vec![
        FakeAgent::failing("C1", "boom"),
        FakeAgent::answering("C2", ""),
    ];
    let err = run_consensus(&agents, &chairmen, "q", &ConsensusConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsensusError::AllChairmenFailed { attempted: 2 }));
}
