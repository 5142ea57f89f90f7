//! Answers "is this top-level module importable?" without importing anything.
//!
//! The environment resolver asks the interpreter once for its search path and
//! builtin/stdlib module names, then answers every query from the filesystem.

use crate::checker::ImportTarget;
use crate::config::PythonConfig;
use crate::error::ScanError;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const PROBE_SCRIPT: &str = "import sys, json; print(json.dumps({\
'path': [p for p in sys.path if p], \
'builtins': list(sys.builtin_module_names), \
'stdlib': sorted(getattr(sys, 'stdlib_module_names', ()))}))";

/// Parses stdin with the interpreter's own grammar and prints every import as
/// `[line, column, top_level_module, level]`, in source order.
const PARSE_SCRIPT: &str = "import ast, sys, json
tree = ast.parse(sys.stdin.buffer.read())
found = []
for node in ast.walk(tree):
    if isinstance(node, ast.Import):
        for alias in node.names:
            found.append([node.lineno, node.col_offset, alias.name.split('.')[0], 0])
    elif isinstance(node, ast.ImportFrom):
        found.append([node.lineno, node.col_offset, (node.module or '').split('.')[0], node.level or 0])
found.sort(key=lambda item: (item[0], item[1]))
print(json.dumps(found))";

/// Used when no interpreter answers the probe.
const STDLIB_MODULES: &[&str] = &[
    "__future__", "abc", "aifc", "antigravity", "argparse", "array", "ast", "asynchat",
    "asyncio", "asyncore", "atexit", "audioop", "base64", "bdb", "binascii", "bisect",
    "builtins", "bz2", "cProfile", "calendar", "cgi", "cgitb", "chunk", "cmath", "cmd",
    "code", "codecs", "codeop", "collections", "colorsys", "compileall", "concurrent",
    "configparser", "contextlib", "contextvars", "copy", "copyreg", "crypt", "csv",
    "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis",
    "distutils", "doctest", "email", "encodings", "ensurepip", "enum", "errno",
    "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions", "ftplib",
    "functools", "gc", "genericpath", "getopt", "getpass", "gettext", "glob",
    "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "idlelib",
    "imaplib", "imghdr", "imp", "importlib", "inspect", "io", "ipaddress", "itertools",
    "json", "keyword", "lib2to3", "linecache", "locale", "logging", "lzma", "mailbox",
    "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder", "msilib",
    "msvcrt", "multiprocessing", "netrc", "nis", "nntplib", "nt", "ntpath",
    "nturl2path", "numbers", "opcode", "operator", "optparse", "os", "ossaudiodev",
    "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil", "platform",
    "plistlib", "poplib", "posix", "posixpath", "pprint", "profile", "pstats", "pty",
    "pwd", "py_compile", "pyclbr", "pydoc", "pydoc_data", "pyexpat", "queue", "quopri",
    "random", "re", "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched",
    "secrets", "select", "selectors", "shelve", "shlex", "shutil", "signal", "site",
    "smtpd", "smtplib", "sndhdr", "socket", "socketserver", "spwd", "sqlite3",
    "sre_compile", "sre_constants", "sre_parse", "ssl", "stat", "statistics", "string",
    "stringprep", "struct", "subprocess", "sunau", "symtable", "sys", "sysconfig",
    "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "textwrap",
    "this", "threading", "time", "timeit", "tkinter", "token", "tokenize", "tomllib",
    "trace", "traceback", "tracemalloc", "tty", "turtle", "turtledemo", "types",
    "typing", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv", "warnings",
    "wave", "weakref", "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib", "xml",
    "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo"
];

/// Oracle deciding whether a top-level module name can be imported.
pub trait ModuleResolver {
    fn resolvable(&self, module: &str) -> bool;

    /// Imports of `source` according to the environment's own parser.
    ///
    /// Consulted only for files the bundled parser rejects. `None` means the
    /// environment rejects the file too, or has no parser to offer.
    fn parse_imports(&self, _source: &str) -> Option<Vec<ImportTarget>> {
        None
    }
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for &R {
    fn resolvable(&self, module: &str) -> bool {
        (**self).resolvable(module)
    }

    fn parse_imports(&self, source: &str) -> Option<Vec<ImportTarget>> {
        (**self).parse_imports(source)
    }
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for Box<R> {
    fn resolvable(&self, module: &str) -> bool {
        (**self).resolvable(module)
    }

    fn parse_imports(&self, source: &str) -> Option<Vec<ImportTarget>> {
        (**self).parse_imports(source)
    }
}

/// Fixed set of importable names.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    modules: HashSet<String>,
}

impl StaticResolver {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }
}

impl ModuleResolver for StaticResolver {
    fn resolvable(&self, module: &str) -> bool {
        self.modules.contains(module)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    path: Vec<PathBuf>,
    builtins: Vec<String>,
    #[serde(default)]
    stdlib: Vec<String>,
}

/// Modules importable by a given Python interpreter.
#[derive(Debug, Default)]
pub struct PythonEnvironment {
    /// Set once the probe succeeded.
    interpreter: Option<String>,
    search_path: Vec<PathBuf>,
    known: HashSet<String>,
    cache: RefCell<HashMap<String, bool>>,
}

impl PythonEnvironment {
    /// Query `config.interpreter` for its module search path.
    pub fn probe(config: &PythonConfig) -> Result<Self, ScanError> {
        let output = Command::new(&config.interpreter)
            .args(["-c", PROBE_SCRIPT])
            .output()
            .map_err(|e| ScanError::Probe(format!("cannot run `{}`: {}", config.interpreter, e)))?;

        if !output.status.success() {
            return Err(ScanError::Probe(format!(
                "`{}` exited with {}: {}",
                config.interpreter,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ScanError::Probe(format!("unexpected probe output: {}", e)))?;

        tracing::debug!(
            interpreter = %config.interpreter,
            search_dirs = probe.path.len(),
            builtins = probe.builtins.len(),
            stdlib = probe.stdlib.len(),
            "probed python environment"
        );

        let mut search_path = config.extra_paths.clone();
        search_path.extend(probe.path);

        let known = probe
            .builtins
            .into_iter()
            .chain(probe.stdlib)
            .chain(config.known_modules.iter().cloned())
            .collect();

        Ok(Self {
            interpreter: Some(config.interpreter.clone()),
            search_path,
            known,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Environment without an interpreter: the standard library plus configured
    /// paths and names.
    pub fn offline(config: &PythonConfig) -> Self {
        Self {
            interpreter: None,
            search_path: config.extra_paths.clone(),
            known: STDLIB_MODULES
                .iter()
                .map(|name| name.to_string())
                .chain(config.known_modules.iter().cloned())
                .collect(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Probe the interpreter, degrading to [`PythonEnvironment::offline`] on failure.
    pub fn detect(config: &PythonConfig) -> Self {
        match Self::probe(config) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(
                    "{}; only the standard library, configured paths and known_modules will count as importable",
                    err
                );
                Self::offline(config)
            }
        }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn is_offline(&self) -> bool {
        self.interpreter.is_none()
    }
}

impl ModuleResolver for PythonEnvironment {
    fn resolvable(&self, module: &str) -> bool {
        if module.is_empty() {
            return false;
        }
        if self.known.contains(module) {
            return true;
        }
        if let Some(&cached) = self.cache.borrow().get(module) {
            return cached;
        }

        let found = self
            .search_path
            .iter()
            .any(|dir| module_exists_in(dir, module));
        self.cache.borrow_mut().insert(module.to_string(), found);
        found
    }

    fn parse_imports(&self, source: &str) -> Option<Vec<ImportTarget>> {
        let interpreter = self.interpreter.as_deref()?;
        let mut child = match Command::new(interpreter)
            .args(["-c", PARSE_SCRIPT])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!("cannot run `{}` to confirm a syntax error: {}", interpreter, err);
                return None;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(source.as_bytes()) {
                tracing::debug!("could not pass source to `{}`: {}", interpreter, err);
            }
        }

        let output = child.wait_with_output().ok()?;
        if !output.status.success() {
            return None;
        }

        let found: Vec<(usize, usize, String, u32)> = match serde_json::from_slice(&output.stdout) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!("unexpected output from `{}`: {}", interpreter, err);
                return None;
            }
        };
        Some(
            found
                .into_iter()
                .map(|(line, _column, module, level)| ImportTarget { module, line, level })
                .collect(),
        )
    }
}

/// True if `dir` holds a package, source, bytecode or extension module named `module`.
///
/// Directories count even without `__init__.py` (namespace packages).
pub fn module_exists_in(dir: &Path, module: &str) -> bool {
    if module.is_empty() || !dir.is_dir() {
        return false;
    }

    let package = dir.join(module);
    if package.is_dir() {
        return true;
    }
    if dir.join(format!("{}.py", module)).is_file() || dir.join(format!("{}.pyc", module)).is_file() {
        return true;
    }

    let prefix = format!("{}.", module);
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with(&prefix) && (name.ends_with(".so") || name.ends_with(".pyd"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_module_exists_in_variants() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("pkg")).unwrap();
        fs::write(dir.join("single.py"), "").unwrap();
        fs::write(dir.join("compiled.pyc"), "").unwrap();
        fs::write(dir.join("fast.cpython-311-x86_64-linux-gnu.so"), "").unwrap();
        fs::write(dir.join("win.cp311-win_amd64.pyd"), "").unwrap();
        fs::write(dir.join("notes.txt"), "").unwrap();

        assert!(module_exists_in(dir, "pkg"));
        assert!(module_exists_in(dir, "single"));
        assert!(module_exists_in(dir, "compiled"));
        assert!(module_exists_in(dir, "fast"));
        assert!(module_exists_in(dir, "win"));
        assert!(!module_exists_in(dir, "notes"));
        assert!(!module_exists_in(dir, "missing"));
        assert!(!module_exists_in(dir, ""));
    }

    #[test]
    fn test_offline_environment_uses_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("vendored.py"), "").unwrap();

        let config = PythonConfig {
            interpreter: "python3".to_string(),
            extra_paths: vec![temp_dir.path().to_path_buf()],
            known_modules: vec!["numpy".to_string()],
        };
        let env = PythonEnvironment::offline(&config);

        assert!(env.resolvable("numpy"));
        assert!(env.resolvable("vendored"));
        assert!(!env.resolvable("totally_nonexistent_module"));
        // cached answers stay stable
        assert!(!env.resolvable("totally_nonexistent_module"));
    }

    #[test]
    fn test_missing_interpreter_is_a_probe_error() {
        let config = PythonConfig {
            interpreter: "definitely-not-a-python-binary".to_string(),
            ..PythonConfig::default()
        };
        let err = PythonEnvironment::probe(&config).unwrap_err();
        assert!(matches!(err, ScanError::Probe(_)));

        let env = PythonEnvironment::detect(&config);
        assert!(env.search_path().is_empty());
        assert!(env.is_offline());
    }

    #[test]
    fn test_offline_environment_knows_stdlib() {
        let env = PythonEnvironment::offline(&PythonConfig::default());

        for module in ["os", "sys", "json", "typing", "__future__", "collections"] {
            assert!(env.resolvable(module), "{}", module);
        }
        assert!(!env.resolvable("requests"));
        assert!(env.parse_imports("import os\n").is_none());
    }

    #[test]
    fn test_interpreter_parses_imports_in_source_order() {
        // needs a working python3 on PATH
        let Ok(env) = PythonEnvironment::probe(&PythonConfig::default()) else {
            return;
        };
        assert!(!env.is_offline());

        let source = "import os.path, json\ndef f():\n    from ..pkg.sub import thing\nfrom . import sibling\n";
        let imports = env.parse_imports(source).unwrap();
        let found: Vec<_> = imports.iter().map(|i| (i.line, i.module.as_str(), i.level)).collect();
        assert_eq!(
            found,
            vec![(1, "os", 0), (1, "json", 0), (3, "pkg", 2), (4, "", 1)]
        );

        assert!(env.parse_imports("if True print('x')\n").is_none());
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new(["os", "sys"]);
        assert!(resolver.resolvable("os"));
        assert!(!resolver.resolvable("requests"));
        assert!((&resolver).resolvable("sys"));
    }
}
