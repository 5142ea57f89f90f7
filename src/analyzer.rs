use crate::{
    checker::{FlaggedFile, SourceChecker},
    config::Config,
    file_discovery::FileDiscovery,
    ignore_filter::IgnoreFilter,
    llm::ChatModel,
    planner::{Plan, PlanRequester},
    report::{MiniReport, ReportBuilder},
    resolver::{ModuleResolver, PythonEnvironment},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub struct Analyzer<R> {
    config: Config,
    file_discovery: FileDiscovery,
    checker: SourceChecker<R>,
    report_builder: ReportBuilder,
}

impl Analyzer<PythonEnvironment> {
    /// Analyzer resolving imports against the configured Python interpreter.
    pub fn new(config: Config) -> Result<Self> {
        let environment = PythonEnvironment::detect(&config.python);
        Self::with_resolver(config, environment)
    }
}

impl<R: ModuleResolver> Analyzer<R> {
    pub fn with_resolver(config: Config, resolver: R) -> Result<Self> {
        let filter = IgnoreFilter::from_config(&config.ignore)?;
        let file_discovery = FileDiscovery::new(&config, filter);
        let checker = SourceChecker::new(config.target_directory.clone(), resolver);
        let report_builder = ReportBuilder::new(config.context_lines);

        Ok(Self {
            config,
            file_discovery,
            checker,
            report_builder,
        })
    }

    /// Checks candidates in walk order until `max_files_in_report` files are flagged.
    ///
    /// Files after the cap is reached are never read.
    pub fn scan(&self) -> ScanOutcome {
        let root = self.file_discovery.root();
        let cap = self.config.max_files_in_report;
        let mut flagged = Vec::new();
        let mut stats = ScanStats::default();

        for relative_path in self.file_discovery.candidates() {
            if flagged.len() >= cap {
                tracing::info!(cap, "flagged-file cap reached, stopping scan");
                stats.truncated = true;
                break;
            }

            stats.files_checked += 1;
            match self.checker.check(&root.join(&relative_path)) {
                Ok(diagnostics) if diagnostics.is_empty() => {
                    tracing::debug!(path = %relative_path.display(), "clean");
                }
                Ok(diagnostics) => {
                    tracing::debug!(
                        path = %relative_path.display(),
                        diagnostics = diagnostics.len(),
                        "flagged"
                    );
                    stats.diagnostics += diagnostics.len();
                    flagged.push(FlaggedFile {
                        relative_path,
                        diagnostics,
                    });
                }
                Err(err) => {
                    tracing::warn!("{}", err);
                    stats.files_failed += 1;
                }
            }
        }

        stats.files_flagged = flagged.len();
        ScanOutcome { flagged, stats }
    }

    pub fn build_reports(&self, flagged: &[FlaggedFile]) -> Vec<MiniReport> {
        self.report_builder.build(self.file_discovery.root(), flagged)
    }

    /// Scan the tree and turn every flagged file into a mini-report.
    pub fn analyze_project(&self) -> ProjectAnalysis {
        let ScanOutcome { flagged, stats } = self.scan();
        let reports = self.build_reports(&flagged);

        ProjectAnalysis {
            root: self.file_discovery.root().to_path_buf(),
            flagged,
            reports,
            stats,
        }
    }

    pub async fn request_plan<M: ChatModel>(&self, analysis: &ProjectAnalysis, model: M) -> Result<Plan> {
        PlanRequester::new(model).request_plan(&analysis.reports).await
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_checked: usize,
    pub files_flagged: usize,
    pub files_failed: usize,
    pub diagnostics: usize,
    /// True when the cap stopped the walk before every candidate was checked.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub flagged: Vec<FlaggedFile>,
    pub stats: ScanStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    pub root: PathBuf,
    pub flagged: Vec<FlaggedFile>,
    pub reports: Vec<MiniReport>,
    pub stats: ScanStats,
}

impl ProjectAnalysis {
    pub fn has_problems(&self) -> bool {
        !self.flagged.is_empty()
    }

    pub fn print_summary(&self) {
        println!("📊 Scan Summary");
        println!("===============");
        println!("  Files checked: {}", self.stats.files_checked);
        println!("  Files flagged: {}", self.stats.files_flagged);
        println!("  Diagnostics:   {}", self.stats.diagnostics);
        if self.stats.files_failed > 0 {
            println!("  Unreadable:    {}", self.stats.files_failed);
        }
        if self.stats.truncated {
            println!("  ⚠️  Stopped early: flagged-file cap reached, remaining files were not checked");
        }

        for report in &self.reports {
            println!("\n📄 {}", report.path);
            for issue in &report.issues {
                println!("   - {} (line {}): {}", issue.kind, issue.line, issue.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::DiagnosticKind;
    use crate::resolver::StaticResolver;
    use std::fs;
    use tempfile::TempDir;

    fn analyzer(root: &std::path::Path, cap: usize) -> Analyzer<StaticResolver> {
        let mut config = Config::default();
        config.target_directory = root.to_path_buf();
        config.max_files_in_report = cap;
        Analyzer::with_resolver(config, StaticResolver::new(["os", "sys"])).unwrap()
    }

    #[test]
    fn test_scan_flags_only_broken_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.py"), "def f()\n    pass\n").unwrap();
        fs::write(root.join("b.py"), "import totally_nonexistent_module\n").unwrap();
        fs::write(root.join("c.py"), "import os\n").unwrap();

        let outcome = analyzer(root, 100).scan();

        assert_eq!(outcome.stats.files_checked, 3);
        assert_eq!(outcome.flagged.len(), 2);
        assert_eq!(outcome.flagged[0].diagnostics[0].kind, DiagnosticKind::SyntaxError);
        assert_eq!(outcome.flagged[1].diagnostics[0].message, "totally_nonexistent_module");
        assert!(!outcome.stats.truncated);
    }

    #[test]
    fn test_cap_stops_the_walk() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for i in 0..10 {
            fs::write(root.join(format!("broken_{:02}.py", i)), "x = (\n").unwrap();
        }

        let outcome = analyzer(root, 4).scan();

        assert_eq!(outcome.flagged.len(), 4);
        assert_eq!(outcome.stats.files_checked, 4);
        assert!(outcome.stats.truncated);
    }

    #[test]
    fn test_zero_cap_checks_nothing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.py"), "x = (\n").unwrap();

        let outcome = analyzer(temp_dir.path(), 0).scan();

        assert!(outcome.flagged.is_empty());
        assert_eq!(outcome.stats.files_checked, 0);
    }

    #[test]
    fn test_unreadable_file_does_not_abort() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a_bad.py"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(root.join("b.py"), "import nope\n").unwrap();

        let outcome = analyzer(root, 100).scan();

        assert_eq!(outcome.stats.files_failed, 1);
        assert_eq!(outcome.flagged.len(), 1);
        assert_eq!(outcome.flagged[0].relative_path, PathBuf::from("b.py"));
    }

    #[test]
    fn test_analyze_project_builds_one_report_per_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.py"), "import one_missing\nimport two_missing\n").unwrap();

        let analysis = analyzer(root, 100).analyze_project();

        assert!(analysis.has_problems());
        assert_eq!(analysis.reports.len(), analysis.flagged.len());
        assert_eq!(analysis.reports[0].issue_count(), analysis.flagged[0].diagnostics.len());
        assert_eq!(analysis.stats.diagnostics, 2);
    }
}
