use crate::{
    analyzer::{ProjectAnalysis, ScanStats},
    llm::TokenUsage,
    planner::Plan,
    report::MiniReport,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};

pub const JSON_REPORT_NAME: &str = "revibe-report.json";
pub const MARKDOWN_REPORT_NAME: &str = "revibe-plan.md";

#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub stats: ScanStats,
    pub files: Vec<MiniReport>,
    pub plan: Option<Plan>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub project_root: String,
    pub version: String,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    /// `model` is `(provider, model)` when a plan was requested.
    pub fn generate_report(&self, analysis: &ProjectAnalysis, plan: Option<&Plan>, model: Option<(&str, &str)>) -> Report {
        Report {
            metadata: ReportMetadata {
                generated_at: chrono::Utc::now().to_rfc3339(),
                project_root: analysis.root.to_string_lossy().to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                llm_provider: model.map(|(provider, _)| provider.to_string()),
                llm_model: model.map(|(_, model)| model.to_string()),
            },
            stats: analysis.stats,
            files: analysis.reports.clone(),
            plan: plan.cloned(),
        }
    }

    /// Writes the JSON and Markdown renderings into `output_dir`, creating it if needed.
    pub fn export_report(&self, report: &Report, output_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

        let json_path = output_dir.join(JSON_REPORT_NAME);
        fs::write(&json_path, serde_json::to_string_pretty(report)?)?;

        let markdown_path = output_dir.join(MARKDOWN_REPORT_NAME);
        fs::write(&markdown_path, self.generate_markdown(report))?;

        Ok(vec![json_path, markdown_path])
    }

    pub fn generate_markdown(&self, report: &Report) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# revibe report\n");
        let _ = writeln!(md, "- Generated: {}", report.metadata.generated_at);
        let _ = writeln!(md, "- Project: `{}`", report.metadata.project_root);
        let _ = writeln!(md, "- Files checked: {}", report.stats.files_checked);
        let _ = writeln!(md, "- Files flagged: {}", report.stats.files_flagged);
        if report.stats.truncated {
            let _ = writeln!(md, "- Scan stopped early at the flagged-file cap");
        }

        if let Some(plan) = &report.plan {
            let _ = writeln!(md, "\n## Remediation plan\n");
            let _ = writeln!(md, "{}", plan.text.trim_end());
            if let Some(usage) = plan.usage {
                let _ = writeln!(md, "\n_{}_", format_usage(&usage));
            }
        }

        if !report.files.is_empty() {
            let _ = writeln!(md, "\n## Flagged files");
        }
        for file in &report.files {
            let _ = writeln!(md, "\n### `{}`\n", file.path);
            for issue in &file.issues {
                let _ = writeln!(md, "- **{}** at line {}: {}", issue.kind, issue.line, issue.message);
                let _ = writeln!(md, "\n```text\n{}\n```\n", issue.snippet);
            }
        }

        md
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_usage(usage: &TokenUsage) -> String {
    format!(
        "Tokens: {} prompt + {} response = {} total",
        usage.prompt_tokens,
        usage.response_tokens,
        usage.prompt_tokens + usage.response_tokens
    )
}
