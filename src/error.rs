//! Error types for per-file scanning failures.

use std::path::PathBuf;
use thiserror::Error;

/// Failures local to one file or one piece of scan configuration.
///
/// None of these abort a scan on their own; the analyzer logs them and
/// moves on to the next candidate.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The file could not be read or was not valid UTF-8.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An ignore pattern is not a valid shell glob.
    #[error("invalid ignore pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The Python interpreter could not be queried for its module search path.
    #[error("python environment probe failed: {0}")]
    Probe(String),
}

impl ScanError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
