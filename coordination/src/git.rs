//! Git collaborator
//!
//! Thin wrapper over the `git` binary used for prompt assembly (diffs,
//! merge bases) and for handing off failed ralph work on a branch.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Git operation failure
#[derive(Debug, Error)]
#[error("Git operation failed: {operation} - {message}")]
pub struct GitError {
    pub operation: String,
    pub message: String,
}

impl GitError {
    fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Lock contention and similar failures that may pass on retry.
    pub fn is_retryable(&self) -> bool {
        let lower = self.message.to_lowercase();
        lower.contains("index.lock")
            || lower.contains("could not lock")
            || lower.contains("another git process")
    }
}

pub type GitResult<T> = Result<T, GitError>;

/// Git state manager scoped to one working directory
#[derive(Debug, Clone)]
pub struct GitManager {
    working_dir: PathBuf,
    max_retries: u32,
}

impl GitManager {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the retry count for transient failures
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run git command and return trimmed stdout
    fn run_git(&self, args: &[&str]) -> GitResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| GitError::new("execute", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::new(args.join(" "), stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run git command with exponential backoff (100ms, 200ms, 400ms) on
    /// lock contention
    fn run_git_with_retry(&self, args: &[&str]) -> GitResult<String> {
        let mut attempt = 0;
        loop {
            match self.run_git(args) {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY_MS * (1 << attempt);
                    std::thread::sleep(std::time::Duration::from_millis(delay));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Resolve a revision to a full commit hash
    pub fn rev_parse(&self, rev: &str) -> GitResult<String> {
        self.run_git(&["rev-parse", rev])
    }

    /// Best common ancestor of two revisions
    pub fn merge_base(&self, a: &str, b: &str) -> GitResult<String> {
        self.run_git(&["merge-base", a, b])
    }

    /// Unified diff between two revisions
    pub fn diff(&self, base: &str, head: &str) -> GitResult<String> {
        self.run_git(&["diff", base, head])
    }

    /// Paths changed between two revisions
    pub fn diff_name_only(&self, base: &str, head: &str) -> GitResult<Vec<String>> {
        let output = self.run_git(&["diff", "--name-only", base, head])?;
        Ok(output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect())
    }

    /// Get current branch name
    pub fn current_branch(&self) -> GitResult<String> {
        self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Create and switch to a new branch, carrying the working tree along
    pub fn checkout_new_branch(&self, branch: &str) -> GitResult<()> {
        self.run_git_with_retry(&["checkout", "-b", branch])
            .map(|_| ())
    }

    pub fn checkout(&self, rev: &str) -> GitResult<()> {
        self.run_git_with_retry(&["checkout", rev]).map(|_| ())
    }

    /// Stage everything and commit, even when nothing changed
    pub fn commit_all(&self, message: &str) -> GitResult<String> {
        self.commit_all_excluding(message, &[])
    }

    /// Like [`commit_all`](Self::commit_all), leaving `excluded` paths
    /// unstaged.
    pub fn commit_all_excluding(&self, message: &str, excluded: &[&str]) -> GitResult<String> {
        let pathspecs: Vec<String> = excluded
            .iter()
            .map(|path| format!(":(exclude){path}"))
            .collect();
        let mut args = vec!["add", "-A", "--", "."];
        args.extend(pathspecs.iter().map(String::as_str));
        self.run_git_with_retry(&args)?;
        self.run_git_with_retry(&["commit", "--allow-empty", "-m", message])?;
        self.run_git(&["rev-parse", "--short", "HEAD"])
    }

    /// Resolve the merge base of `head` against the usual default branches.
    pub fn default_merge_base(&self, head: &str) -> GitResult<String> {
        let mut last_error = None;
        for candidate in ["origin/main", "main", "origin/master", "master"] {
            match self.merge_base(candidate, head) {
                Ok(sha) => return Ok(sha),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| GitError::new("merge-base", "no candidate branches")))
    }
}
