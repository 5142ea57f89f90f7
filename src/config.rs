use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target_directory: PathBuf,
    pub file_extensions: Vec<String>,
    /// Scanning stops once this many files have been flagged.
    pub max_files_in_report: usize,
    /// Lines shown before and after the offending line in each snippet.
    pub context_lines: usize,
    pub ignore: IgnoreConfig,
    pub python: PythonConfig,
    pub llm: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Entry names skipped on exact match.
    pub names: Vec<String>,
    /// Shell-style globs matched against entry names.
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    pub interpreter: String,
    pub extra_paths: Vec<PathBuf>,
    pub known_modules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum LLMProvider {
    Gemini,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    Ollama,
}

impl LLMProvider {
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            LLMProvider::Gemini => Some("GEMINI_API_KEY"),
            LLMProvider::OpenAI => Some("OPENAI_API_KEY"),
            LLMProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            LLMProvider::Ollama => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProvider::Gemini => "gemini-2.0-flash",
            LLMProvider::OpenAI => "gpt-4o-mini",
            LLMProvider::Anthropic => "claude-3-5-haiku-latest",
            LLMProvider::Ollama => "llama3.1",
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LLMProvider::Gemini => "Gemini",
            LLMProvider::OpenAI => "OpenAI",
            LLMProvider::Anthropic => "Anthropic",
            LLMProvider::Ollama => "Ollama",
        };
        f.write_str(name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_directory: PathBuf::from("."),
            file_extensions: vec!["py".to_string()],
            max_files_in_report: 100,
            context_lines: 5,
            ignore: IgnoreConfig::default(),
            python: PythonConfig::default(),
            llm: LLMConfig::default(),
        }
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            names: [".git", ".gitignore", ".env", "__pycache__", ".venv", "venv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            patterns: ["*.pyc", "node_modules", ".DS_Store"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            extra_paths: Vec::new(),
            known_modules: Vec::new(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            api_key: None,
            base_url: None,
            model: LLMProvider::Gemini.default_model().to_string(),
            max_tokens: 4000,
            temperature: 0.2,
            timeout_seconds: 300,
        }
    }
}

impl Config {
    /// Get the default config file path (~/.revibe.toml)
    pub fn default_config_path() -> crate::Result<PathBuf> {
        let home_dir = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(PathBuf::from(home_dir).join(".revibe.toml"))
    }

    /// Load config from the default location, falling back to defaults if it doesn't exist
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::default_config_path()?;

        let mut config = if config_path.exists() {
            tracing::info!(path = %config_path.display(), "loading configuration");
            Self::from_file(&config_path)?
        } else {
            tracing::debug!(path = %config_path.display(), "no config file found, using defaults");
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific file path
    pub fn from_file(path: &PathBuf) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Fill the API key from the provider's environment variable when the file has none.
    pub fn apply_env(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = self
                .llm
                .provider
                .api_key_var()
                .and_then(|var| env::var(var).ok())
                .filter(|key| !key.is_empty());
        }
    }

    /// Save config to a file
    pub fn to_file(&self, path: &PathBuf) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create a config file with all available options documented
    pub fn create_documented_config() -> String {
        r#"# revibe configuration file

# Directory to scan (defaults to current directory)
target_directory = "."

# Source extensions that are checked
file_extensions = ["py"]

# Scanning stops as soon as this many files have been flagged
max_files_in_report = 100

# Lines of context shown before and after each problem line
context_lines = 5

[ignore]
# Entry names skipped on exact match (files and directories)
names = [".git", ".gitignore", ".env", "__pycache__", ".venv", "venv"]

# Shell-style glob patterns (*, ?, [...]) matched against entry names
patterns = ["*.pyc", "node_modules", ".DS_Store"]

[python]
# Interpreter whose installed packages decide whether an import resolves.
# Modules are looked up on disk; nothing is imported or executed.
# Files the bundled parser (Python 3.11 grammar) rejects are parsed once more
# by this interpreter, so newer syntax it accepts is not reported.
# Without a working interpreter only the standard library counts as installed.
interpreter = "python3"

# Additional directories searched for importable modules
extra_paths = []

# Module names always treated as importable
known_modules = []

[llm]
# LLM provider: "Gemini", "OpenAI", "Anthropic" or "Ollama"
provider = "Gemini"

# API key for the provider (can also be set via environment variables or a .env file)
# Gemini: GEMINI_API_KEY
# OpenAI: OPENAI_API_KEY
# Anthropic: ANTHROPIC_API_KEY
# api_key = "your-api-key-here"

# Base URL (mainly for Ollama local instances)
# base_url = "http://localhost:11434"

# Model to use
model = "gemini-2.0-flash"

# Maximum tokens for the plan
max_tokens = 4000

# Temperature (0.0 = deterministic, 1.0 = creative)
temperature = 0.2

# Request timeout in seconds
timeout_seconds = 300
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_documented_config_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::create_documented_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(config.max_files_in_report, defaults.max_files_in_report);
        assert_eq!(config.context_lines, defaults.context_lines);
        assert_eq!(config.ignore.names, defaults.ignore.names);
        assert_eq!(config.ignore.patterns, defaults.ignore.patterns);
        assert_eq!(config.llm.provider, LLMProvider::Gemini);
        assert_eq!(config.llm.model, defaults.llm.model);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str("max_files_in_report = 7\n[llm]\nprovider = \"Ollama\"\n").unwrap();

        assert_eq!(config.max_files_in_report, 7);
        assert_eq!(config.context_lines, 5);
        assert_eq!(config.llm.provider, LLMProvider::Ollama);
        assert!(config.ignore.names.contains(&".git".to_string()));
    }

    #[test]
    fn test_config_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("revibe.toml");

        let mut config = Config::default();
        config.context_lines = 2;
        config.python.known_modules = vec!["numpy".to_string()];
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.context_lines, 2);
        assert_eq!(loaded.python.known_modules, vec!["numpy".to_string()]);
    }

    #[test]
    fn test_explicit_api_key_is_kept() {
        let mut config = Config::default();
        config.llm.api_key = Some("from-file".to_string());
        config.apply_env();
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
    }
}
