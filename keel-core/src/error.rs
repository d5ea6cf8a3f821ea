//! Error types for keel-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or saving manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O failure (permission denied, not a file, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file did not exist.
    #[error("manifest not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load. Includes file path and line context from serde_yaml.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An inputs file parsed, but its top level is not a mapping.
    #[error("inputs at {path} must be a mapping of variable names to values")]
    NotAMapping { path: PathBuf },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience constructor for [`ManifestError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
