//! Prompt builders for both consensus modes
//!
//! Chairman prompts embed only successful Stage 1 outputs, in agent-list
//! order, so identical Stage 1 outcomes always produce identical prompts.

use super::agent::AgentResult;

/// Render the successful analyses as labeled sections.
fn analyses_section(results: &[AgentResult]) -> String {
    let mut out = String::new();
    for result in results.iter().filter(|r| r.succeeded()) {
        out.push_str(&format!(
            "--- {} Analysis ---\n{}\n\n",
            result.agent_name, result.output
        ));
    }
    out
}

fn succeeded_count(results: &[AgentResult]) -> usize {
    results.iter().filter(|r| r.succeeded()).count()
}

/// Default chairman prompt: original question plus every successful analysis.
pub fn build_chairman_prompt(original_prompt: &str, results: &[AgentResult]) -> String {
    format!(
        "Compile consensus from {} of {} analyses.\n\n\
         ## Original Prompt\n\n{}\n\n\
         ## Analyses\n\n{}",
        succeeded_count(results),
        results.len(),
        original_prompt,
        analyses_section(results)
    )
}

/// Stage 1 prompt for answering a free-form question.
pub fn build_general_prompt(question: &str, context: &str) -> String {
    let mut prompt = String::from(
        "You are one of several independent experts asked the same question. \
         Answer it directly and thoroughly. State your reasoning, your confidence, \
         and any risks or caveats.\n\n",
    );
    prompt.push_str(&format!("## Question\n\n{}\n", question));
    if !context.trim().is_empty() {
        prompt.push_str(&format!("\n## Additional Context\n\n{}\n", context));
    }
    prompt
}

/// Chairman prompt for the general-prompt mode.
pub fn build_general_chairman_prompt(question: &str, results: &[AgentResult]) -> String {
    format!(
        "You are the chairman of an expert panel. {} of {} experts answered the \
         question below. Synthesize one final answer:\n\
         1. Points where the experts agree (high confidence)\n\
         2. Points where they disagree, and which position is better supported\n\
         3. Anything only one expert raised that matters\n\
         4. Your final recommendation\n\n\
         ## Question\n\n{}\n\n## Expert Answers\n\n{}",
        succeeded_count(results),
        results.len(),
        question,
        analyses_section(results)
    )
}

/// Stage 1 prompt for reviewing a change set.
pub fn build_code_review_prompt(
    description: &str,
    diff: &str,
    modified_files: &str,
    plan: &str,
) -> String {
    let mut prompt = String::from(
        "You are reviewing a code change. Report issues by severity \
         (Critical, Important, Suggestion) with file and line references. \
         Only report real problems; say so plainly if the change looks correct.\n\n",
    );
    prompt.push_str(&format!("## Change Description\n\n{}\n\n", description));
    if !plan.trim().is_empty() {
        prompt.push_str(&format!("## Implementation Plan\n\n{}\n\n", plan));
    }
    prompt.push_str(&format!("## Modified Files\n\n{}\n", modified_files));
    prompt.push_str(&format!("## Diff\n\n```diff\n{}\n```\n", diff));
    prompt
}

/// Chairman prompt for the code-review mode.
pub fn build_code_review_chairman_prompt(
    description: &str,
    modified_files: &str,
    results: &[AgentResult],
) -> String {
    format!(
        "You are the chairman of a code review panel. {} of {} reviewers examined \
         the change below. Produce one consolidated review:\n\
         - Issues raised by several reviewers first (high confidence)\n\
         - Then single-reviewer issues you judge valid\n\
         - Drop false positives and duplicates\n\
         - End with a verdict: APPROVE, APPROVE WITH CHANGES, or REQUEST CHANGES\n\n\
         ## Change Description\n\n{}\n\n## Modified Files\n\n{}\n\n## Reviews\n\n{}",
        succeeded_count(results),
        results.len(),
        description,
        modified_files,
        analyses_section(results)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::AgentError;

    fn results() -> Vec<AgentResult> {
        vec![
            AgentResult::success("Claude", "looks good"),
            AgentResult::failure("Gemini", AgentError::RequestFailed("503".into())),
            AgentResult::success("Codex", "missing test"),
        ]
    }

    #[test]
    fn test_chairman_prompt_only_successes_in_order() {
        let prompt = build_chairman_prompt("q", &results());
        assert!(prompt.starts_with("Compile consensus from 2 of 3 analyses."));
        assert!(!prompt.contains("Gemini"));
        let claude = prompt.find("--- Claude Analysis ---").unwrap();
        let codex = prompt.find("--- Codex Analysis ---").unwrap();
        assert!(claude < codex);
    }

    #[test]
    fn test_chairman_prompt_is_deterministic() {
        assert_eq!(
            build_code_review_chairman_prompt("d", "a.rs", &results()),
            build_code_review_chairman_prompt("d", "a.rs", &results())
        );
    }

    #[test]
    fn test_general_prompt_context_optional() {
        assert!(!build_general_prompt("why?", "  ").contains("Additional Context"));
        assert!(build_general_prompt("why?", "ctx").contains("## Additional Context\n\nctx"));
    }

    #[test]
    fn test_code_review_prompt_sections() {
        let prompt = build_code_review_prompt("fix bug", "+a\n-b", "src/lib.rs\n", "");
        assert!(prompt.contains("## Change Description\n\nfix bug"));
        assert!(prompt.contains("```diff\n+a\n-b\n```"));
        assert!(!prompt.contains("Implementation Plan"));
    }
}
