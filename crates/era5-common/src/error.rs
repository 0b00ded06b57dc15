//! Error types for ERA5 subset operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using Era5Error.
pub type Era5Result<T> = Result<T, Era5Error>;

/// Primary error type for ERA5 subset operations.
#[derive(Debug, Error)]
pub enum Era5Error {
    // === Query Errors (raised before any remote I/O) ===
    #[error("invalid {field}: got {value}, expected {expected}")]
    Validation {
        field: String,
        value: String,
        expected: String,
    },

    // === Remote Errors ===
    #[error("remote store error: {0}")]
    Connectivity(String),

    #[error("unexpected remote structure: {0}")]
    Format(String),

    /// A slicing request named a dimension the selected variables do not have.
    #[error("dimension '{0}' is not a valid dimension of the selected variables")]
    MissingDimension(String),

    // === Selection Errors (against an already materialized subset) ===
    #[error("{what} {requested} is not in the dataset, available: {available}")]
    Selection {
        what: String,
        requested: String,
        available: String,
    },

    // === Local Errors ===
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Era5Error {
    /// Create a Validation error.
    pub fn validation(
        field: impl Into<String>,
        value: impl std::fmt::Display,
        expected: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Create a Selection error listing the available set.
    pub fn selection<T: std::fmt::Debug>(
        what: impl Into<String>,
        requested: impl std::fmt::Display,
        available: &[T],
    ) -> Self {
        Self::Selection {
            what: what.into(),
            requested: requested.to_string(),
            available: format!("{:?}", available),
        }
    }

    /// Create a Filesystem error for the given path.
    pub fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a Connectivity error.
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Whether this error was raised while validating a query.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether this error came from selecting out of a materialized subset.
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::Selection { .. })
    }
}

impl From<serde_json::Error> for Era5Error {
    fn from(err: serde_json::Error) -> Self {
        Era5Error::Serialization(format!("JSON error: {}", err))
    }
}
