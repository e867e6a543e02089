//! Error types for the governance engine
//!
//! Only [`GovernanceError`] can abort a scan. [`LoadError`] and
//! [`ResolutionError`] are scoped to a single document and end up in the
//! report as issues.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Errors that abort a whole scan
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Repository root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

/// A document that could not be loaded into the corpus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("cannot read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("{path} is not valid {format}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("{path} must contain a schema object at the top level")]
    NotAnObject { path: PathBuf },

    #[error("{path} is not inside a vMAJOR.MINOR.PATCH folder (found '{folder}')")]
    VersionFolder { path: PathBuf, folder: String },
}

impl LoadError {
    /// Path of the offending document
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Io { path, .. }
            | Self::Parse { path, .. }
            | Self::NotAnObject { path }
            | Self::VersionFolder { path, .. } => path,
        }
    }
}

/// Failure to dereference a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("cyclic reference: {}", cycle.join(" -> "))]
    Cyclic {
        /// Every identity on the cycle; the first entry is repeated at the end
        cycle: Vec<String>,
    },

    #[error("unresolved reference '{uri}' at {location}")]
    Unresolved { uri: String, location: String },

    #[error("ambiguous reference '{uri}': declared by {}", candidates.join(", "))]
    Ambiguous { uri: String, candidates: Vec<String> },

    #[error("reference chain deeper than {max_depth} at {location}")]
    DepthExceeded { max_depth: usize, location: String },
}
