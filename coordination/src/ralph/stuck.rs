//! Stuck-pattern detection
//!
//! Two failures are "the same" when their normalized signatures match.
//! Normalization removes the noise that changes between otherwise identical
//! runs: colour codes, hashes, numbers (line numbers, durations, pids) and
//! whitespace.

use regex::Regex;
use std::sync::LazyLock;

/// Instruction prepended to the task once the loop is judged stuck.
pub const STUCK_DIRECTIVE: &str = "IMPORTANT: Previous attempts at this task have failed \
repeatedly with the same error. The current approach is not working. Step back, re-read \
the task and the failure output, and take a fundamentally different approach. Do not \
repeat the changes you made before.";

/// Only the tail of a failure is compared; it is where the error lives.
const SIGNATURE_TAIL_LINES: usize = 40;

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ANSI_RE regex should compile")
});

static HEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:0x)?[0-9a-fA-F]{7,}\b").expect("HEX_RE regex should compile")
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("NUMBER_RE regex should compile"));

static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("SPACE_RE regex should compile"));

/// Strip run-to-run noise from gate output.
pub fn normalize_failure(output: &str) -> String {
    let cleaned = ANSI_RE.replace_all(output, "");
    let lines: Vec<&str> = cleaned
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let tail = &lines[lines.len().saturating_sub(SIGNATURE_TAIL_LINES)..];

    tail.iter()
        .map(|line| {
            let line = HEX_RE.replace_all(line, "<hex>");
            let line = NUMBER_RE.replace_all(&line, "<n>");
            SPACE_RE.replace_all(&line, " ").into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Signature of a gate failure; equal signatures mean the loop made no
/// progress between the two attempts.
pub fn failure_signature(gate: &str, output: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(gate.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_failure(output).as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

/// A threshold of zero disables stuck detection.
pub fn is_stuck(stuck_count: u32, threshold: u32) -> bool {
    threshold > 0 && stuck_count >= threshold
}
