//! Name-based ignore rules shared by the tree walker and the tree view.

use crate::error::ScanError;
use globset::{Glob, GlobMatcher};

/// A single rule deciding whether a directory entry is skipped.
#[derive(Debug, Clone)]
pub enum IgnoreRule {
    ExactName(String),
    Glob(GlobMatcher),
}

impl IgnoreRule {
    pub fn glob(pattern: &str) -> Result<Self, ScanError> {
        let glob = Glob::new(pattern).map_err(|source| ScanError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(IgnoreRule::Glob(glob.compile_matcher()))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            IgnoreRule::ExactName(exact) => exact == name,
            IgnoreRule::Glob(matcher) => matcher.is_match(name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    rules: Vec<IgnoreRule>,
}

impl IgnoreFilter {
    pub fn new<N, P>(names: N, patterns: P) -> Result<Self, ScanError>
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut rules: Vec<IgnoreRule> = names
            .into_iter()
            .map(|name| IgnoreRule::ExactName(name.as_ref().to_string()))
            .collect();

        for pattern in patterns {
            rules.push(IgnoreRule::glob(pattern.as_ref())?);
        }

        Ok(Self { rules })
    }

    pub fn from_config(config: &crate::config::IgnoreConfig) -> Result<Self, ScanError> {
        Self::new(&config.names, &config.patterns)
    }

    /// True if `name` (a bare file or directory name, not a path) is excluded.
    pub fn should_ignore(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> IgnoreFilter {
        IgnoreFilter::from_config(&crate::config::IgnoreConfig::default()).unwrap()
    }

    #[test]
    fn test_exact_names() {
        let filter = default_filter();
        assert!(filter.should_ignore(".git"));
        assert!(filter.should_ignore("__pycache__"));
        assert!(filter.should_ignore("venv"));
        assert!(!filter.should_ignore("venv2"));
        assert!(!filter.should_ignore("git"));
    }

    #[test]
    fn test_glob_patterns() {
        let filter = default_filter();
        assert!(filter.should_ignore("module.pyc"));
        assert!(filter.should_ignore("node_modules"));
        assert!(filter.should_ignore(".DS_Store"));
        assert!(!filter.should_ignore("module.py"));
    }

    #[test]
    fn test_question_mark_and_class() {
        let filter = IgnoreFilter::new(Vec::<String>::new(), ["build?", "tmp[0-9]"]).unwrap();
        assert!(filter.should_ignore("build1"));
        assert!(!filter.should_ignore("build"));
        assert!(filter.should_ignore("tmp3"));
        assert!(!filter.should_ignore("tmpx"));
    }

    #[test]
    fn test_case_sensitive() {
        let filter = default_filter();
        assert!(!filter.should_ignore(".GIT"));
        assert!(!filter.should_ignore("MODULE.PYC"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = IgnoreFilter::new(Vec::<String>::new(), ["[unclosed"]).unwrap_err();
        assert!(matches!(err, ScanError::InvalidPattern { .. }));
    }
}
