//! Typed failures shared by every resolver operation.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::AdminLevel;

/// Where a containment query came up empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoMatchScope {
    /// The point lies outside every polygon of the global level-0 dataset.
    Country,
    /// The country resolved, but the catalog publishes no dataset for it.
    NoFinerData { country: String },
    /// The point is not covered by the dataset examined for this country and level.
    Dataset { country: String, level: AdminLevel },
}

impl fmt::Display for NoMatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatchScope::Country => write!(f, "point is not inside any covered country"),
            NoMatchScope::NoFinerData { country } => {
                write!(f, "no administrative data published for {}", country)
            }
            NoMatchScope::Dataset { country, level } => {
                write!(f, "point is not covered by the {} {} dataset", country, level)
            }
        }
    }
}

/// Stable category a transport maps to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    NotFound,
    DataError,
    Internal,
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("invalid administrative level '{0}'")]
    InvalidLevel(String),

    #[error(
        "no {} dataset found for {country}",
        .level.map_or_else(|| "administrative".to_string(), |l| l.to_string())
    )]
    DatasetNotFound {
        country: String,
        /// `None` when the country has no datasets at all
        level: Option<AdminLevel>,
    },

    #[error("no matching polygon found: {0}")]
    NoMatch(NoMatchScope),

    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported coordinate reference system '{crs}' in {}", .path.display())]
    UnsupportedCrs { path: PathBuf, crs: String },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to export boundary to {}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LocateError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        LocateError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LocateError::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify the failure so clients can tell bad input from missing
    /// coverage from broken server data.
    pub fn class(&self) -> ErrorClass {
        match self {
            LocateError::InvalidLevel(_) => ErrorClass::BadRequest,
            LocateError::DatasetNotFound { .. } | LocateError::NoMatch(_) => ErrorClass::NotFound,
            LocateError::Parse { .. } | LocateError::UnsupportedCrs { .. } => {
                ErrorClass::DataError
            }
            LocateError::Io { .. } | LocateError::Export { .. } | LocateError::Config(_) => {
                ErrorClass::Internal
            }
        }
    }
}

pub type Result<T, E = LocateError> = std::result::Result<T, E>;
