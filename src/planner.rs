//! Turns mini-reports into a prompt and asks the model for a remediation plan.

use crate::llm::{ChatModel, TokenUsage};
use crate::report::MiniReport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const SYSTEM_INSTRUCTION: &str = "You are a senior Python engineer helping a developer repair a broken codebase. \
You receive reports of files that fail to parse or import modules that cannot be found. \
Answer with a concise, numbered, step-by-step plan. Reference files by path and line. \
Do not rewrite whole files; show only the minimal code changes each step needs.";

const CLOSING_INSTRUCTION: &str = "Using the reports above, write a sequential remediation plan. \
Order the steps so that syntax errors are fixed before import problems, and group steps by file. \
For each unresolved import, say whether the module should be installed, created, or the import removed.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

pub struct PlanRequester<M> {
    model: M,
}

impl<M: ChatModel> PlanRequester<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Sends every report in one request. No request is made when there is nothing to fix.
    pub async fn request_plan(&self, reports: &[MiniReport]) -> Result<Plan> {
        if reports.is_empty() {
            return Ok(Plan {
                text: "No problems found; nothing to fix.".to_string(),
                usage: None,
            });
        }

        let prompt = build_prompt(reports);
        tracing::info!(files = reports.len(), prompt_chars = prompt.len(), "requesting remediation plan");

        let completion = self
            .model
            .complete(SYSTEM_INSTRUCTION, &prompt)
            .await
            .context("failed to obtain a remediation plan")?;

        Ok(Plan {
            text: completion.text,
            usage: completion.usage,
        })
    }
}

/// Deterministic transcript of `reports`, followed by the closing instruction.
pub fn build_prompt(reports: &[MiniReport]) -> String {
    let mut prompt = String::from("The following Python files have problems that need fixing.\n");

    for (index, report) in reports.iter().enumerate() {
        let _ = writeln!(prompt, "\n## File {}: {}", index + 1, report.path);

        if !report.leading_doc.is_empty() {
            let _ = writeln!(prompt, "Module documentation:\n{}", report.leading_doc);
        }

        prompt.push_str("Issues:\n");
        for issue in &report.issues {
            let _ = writeln!(prompt, "- {} at line {}: {}", issue.kind, issue.line, describe(&issue.message));
            let _ = writeln!(prompt, "```python\n{}\n```", issue.snippet);
        }
    }

    prompt.push('\n');
    prompt.push_str(CLOSING_INSTRUCTION);
    prompt
}

fn describe(message: &str) -> &str {
    if message.is_empty() {
        "(relative import with no module name)"
    } else {
        message
    }
}
