use crate::checker::{DiagnosticKind, FlaggedFile};
use crate::context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Opening line of a module docstring, with an optional string prefix.
static DOCSTRING_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?i:[rub]|br|rb)?("""|''')"#).expect("valid docstring regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: DiagnosticKind,
    pub line: usize,
    pub message: String,
    pub snippet: String,
}

/// Everything the plan requester needs to know about one flagged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniReport {
    pub path: String,
    pub leading_doc: String,
    pub issues: Vec<Issue>,
}

impl MiniReport {
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

pub struct ReportBuilder {
    context_lines: usize,
}

impl ReportBuilder {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    /// One report per flagged file, in input order.
    pub fn build(&self, root: &Path, flagged: &[FlaggedFile]) -> Vec<MiniReport> {
        flagged.iter().map(|file| self.build_one(root, file)).collect()
    }

    pub fn build_one(&self, root: &Path, file: &FlaggedFile) -> MiniReport {
        let full_path = root.join(&file.relative_path);

        let leading_doc = match fs::read_to_string(&full_path) {
            Ok(source) => leading_doc(&source),
            Err(err) => {
                tracing::warn!("could not read docstring of {}: {}", full_path.display(), err);
                String::new()
            }
        };

        let issues = file
            .diagnostics
            .iter()
            .map(|diagnostic| Issue {
                kind: diagnostic.kind,
                line: diagnostic.line,
                message: diagnostic.message.clone(),
                snippet: context::extract(&full_path, diagnostic.line, self.context_lines),
            })
            .collect();

        MiniReport {
            path: file.relative_path.to_string_lossy().replace('\\', "/"),
            leading_doc,
            issues,
        }
    }
}

/// The module docstring block at the top of `source`, or an empty string.
///
/// Only considered when it is the first non-empty line. The opening line closes
/// the block itself only if the marker appears again after the opener.
pub fn leading_doc(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let Some(first) = lines.iter().position(|line| !line.trim().is_empty()) else {
        return String::new();
    };

    let opening = lines[first].trim_start();
    let Some(captures) = DOCSTRING_OPEN.captures(opening) else {
        return String::new();
    };
    let Some(marker) = captures.get(1) else {
        return String::new();
    };

    if opening[marker.end()..].contains(marker.as_str()) {
        return lines[first].to_string();
    }

    let mut end = lines.len();
    for (index, line) in lines.iter().enumerate().skip(first + 1) {
        if line.contains(marker.as_str()) {
            end = index + 1;
            break;
        }
    }

    lines[first..end].join("\n")
}
