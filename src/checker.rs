use crate::error::ScanError;
use crate::resolver::{module_exists_in, ModuleResolver};
use rustpython_parser::{ast, Parse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    SyntaxError,
    UnresolvedImport,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::SyntaxError => f.write_str("SyntaxError"),
            DiagnosticKind::UnresolvedImport => f.write_str("UnresolvedImport"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// 1-based; 0 when the parser gave no position.
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn syntax_error(line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::SyntaxError,
            line,
            message: message.into(),
        }
    }

    pub fn unresolved_import(line: usize, module: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::UnresolvedImport,
            line,
            message: module.into(),
        }
    }
}

/// A scanned file with at least one diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedFile {
    pub relative_path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses Python sources and checks that their imports resolve.
pub struct SourceChecker<R> {
    root: PathBuf,
    resolver: R,
}

impl<R: ModuleResolver> SourceChecker<R> {
    pub fn new(root: impl Into<PathBuf>, resolver: R) -> Self {
        Self {
            root: root.into(),
            resolver,
        }
    }

    /// Diagnostics for the file at `path` (absolute, or relative to the working directory).
    pub fn check(&self, path: &Path) -> Result<Vec<Diagnostic>, ScanError> {
        let source = fs::read_to_string(path).map_err(|e| ScanError::read(path, e))?;
        let file_dir = path.parent().unwrap_or(self.root.as_path());
        Ok(self.check_source(&source, &path.to_string_lossy(), file_dir))
    }

    /// A parse failure yields exactly one `SyntaxError` and skips import checks.
    ///
    /// When the bundled parser rejects a file, the resolver's environment gets
    /// the final say on the grammar (newer Python releases accept more).
    pub fn check_source(&self, source: &str, source_path: &str, file_dir: &Path) -> Vec<Diagnostic> {
        let imports = match ast::Suite::parse(source, source_path) {
            Ok(suite) => {
                let mut imports = Vec::new();
                collect_imports(&suite, source, &mut imports);
                imports
            }
            Err(err) => match self.resolver.parse_imports(source) {
                Some(imports) => {
                    tracing::debug!(
                        path = source_path,
                        error = %err.error,
                        "interpreter accepts a file the bundled parser rejected"
                    );
                    imports
                }
                None => {
                    let offset = u32::from(err.offset) as usize;
                    return vec![Diagnostic::syntax_error(
                        error_line(source, offset),
                        err.error.to_string(),
                    )];
                }
            },
        };

        imports
            .into_iter()
            .filter(|import| !self.is_resolvable(import, file_dir))
            .map(|import| Diagnostic::unresolved_import(import.line, import.module))
            .collect()
    }

    fn is_resolvable(&self, import: &ImportTarget, file_dir: &Path) -> bool {
        if import.level > 0 {
            return match package_dir(file_dir, import.level) {
                Some(base) if import.module.is_empty() => base.is_dir(),
                Some(base) => module_exists_in(&base, &import.module),
                None => false,
            };
        }

        module_exists_in(file_dir, &import.module)
            || module_exists_in(&self.root, &import.module)
            || self.resolver.resolvable(&import.module)
    }
}

/// A top-level module name referenced by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    /// Empty for `from . import x`.
    pub module: String,
    pub line: usize,
    /// Leading dots of a relative `from` import.
    pub level: u32,
}

fn collect_imports(body: &[ast::Stmt], source: &str, out: &mut Vec<ImportTarget>) {
    for stmt in body {
        match stmt {
            ast::Stmt::Import(import) => {
                let line = line_at(source, u32::from(import.range.start()) as usize);
                for alias in &import.names {
                    out.push(ImportTarget {
                        module: top_level(alias.name.as_str()).to_string(),
                        line,
                        level: 0,
                    });
                }
            }
            ast::Stmt::ImportFrom(import) => {
                let line = line_at(source, u32::from(import.range.start()) as usize);
                let module = import
                    .module
                    .as_ref()
                    .map(|m| top_level(m.as_str()).to_string())
                    .unwrap_or_default();
                out.push(ImportTarget {
                    module,
                    line,
                    level: import.level.as_ref().map(|l| l.to_u32()).unwrap_or(0),
                });
            }
            ast::Stmt::FunctionDef(def) => collect_imports(&def.body, source, out),
            ast::Stmt::AsyncFunctionDef(def) => collect_imports(&def.body, source, out),
            ast::Stmt::ClassDef(def) => collect_imports(&def.body, source, out),
            ast::Stmt::If(stmt) => {
                collect_imports(&stmt.body, source, out);
                collect_imports(&stmt.orelse, source, out);
            }
            ast::Stmt::For(stmt) => {
                collect_imports(&stmt.body, source, out);
                collect_imports(&stmt.orelse, source, out);
            }
            ast::Stmt::AsyncFor(stmt) => {
                collect_imports(&stmt.body, source, out);
                collect_imports(&stmt.orelse, source, out);
            }
            ast::Stmt::While(stmt) => {
                collect_imports(&stmt.body, source, out);
                collect_imports(&stmt.orelse, source, out);
            }
            ast::Stmt::With(stmt) => collect_imports(&stmt.body, source, out),
            ast::Stmt::AsyncWith(stmt) => collect_imports(&stmt.body, source, out),
            ast::Stmt::Try(stmt) => {
                collect_imports(&stmt.body, source, out);
                for handler in &stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    collect_imports(&handler.body, source, out);
                }
                collect_imports(&stmt.orelse, source, out);
                collect_imports(&stmt.finalbody, source, out);
            }
            ast::Stmt::TryStar(stmt) => {
                collect_imports(&stmt.body, source, out);
                for handler in &stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    collect_imports(&handler.body, source, out);
                }
                collect_imports(&stmt.orelse, source, out);
                collect_imports(&stmt.finalbody, source, out);
            }
            ast::Stmt::Match(stmt) => {
                for case in &stmt.cases {
                    collect_imports(&case.body, source, out);
                }
            }
            _ => {}
        }
    }
}

fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// Directory a relative import of `level` dots refers to.
fn package_dir(file_dir: &Path, level: u32) -> Option<PathBuf> {
    let mut dir = file_dir;
    for _ in 1..level {
        dir = dir.parent()?;
    }
    Some(dir.to_path_buf())
}

/// Line reported for a parse error at `offset`. Errors raised at end of input
/// land on the last non-blank line instead of one past the end of the file.
fn error_line(source: &str, offset: usize) -> usize {
    let content = source.trim_end();
    if offset >= content.len() {
        line_at(content, content.len())
    } else {
        line_at(source, offset)
    }
}

/// 1-based line containing byte `offset`.
pub fn line_at(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
