pub mod analyzer;
pub mod checker;
pub mod config;
pub mod context;
pub mod error;
pub mod file_discovery;
pub mod ignore_filter;
pub mod llm;
pub mod planner;
pub mod report;
pub mod reporter;
pub mod resolver;

pub use analyzer::{Analyzer, ProjectAnalysis, ScanStats};
pub use checker::{Diagnostic, DiagnosticKind, FlaggedFile, ImportTarget, SourceChecker};
pub use config::Config;
pub use error::ScanError;
pub use file_discovery::FileDiscovery;
pub use ignore_filter::{IgnoreFilter, IgnoreRule};
pub use llm::{ChatModel, Completion, LLMClient, TokenUsage};
pub use planner::{Plan, PlanRequester};
pub use report::{Issue, MiniReport, ReportBuilder};
pub use reporter::Reporter;
pub use resolver::{ModuleResolver, PythonEnvironment, StaticResolver};

pub type Result<T> = anyhow::Result<T>;
