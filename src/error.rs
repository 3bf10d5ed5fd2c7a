//! Error types
//!
//! Library calls return [`Error`]; the executor binary converts it into a
//! printed message and a non-zero exit.

use crate::store::StoreError;
use std::time::Duration;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Workflow or namespace creation
    Submit,
    Suspend,
    /// Executor create or patch of a release
    Apply,
    /// Executor delete of a release
    Delete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Submit => write!(f, "submit"),
            Stage::Suspend => write!(f, "suspend"),
            Stage::Apply => write!(f, "apply"),
            Stage::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rendered field is missing or empty
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required input (group, workflow, chart source) is absent or inconsistent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rendering or DAG assembly failed
    #[error("Failed to generate {direction} workflow: {source}")]
    Generation {
        direction: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Execution records could not be correlated, or the graph cannot be leveled
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Store error during {stage}: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("Timed out waiting for condition after {0:?}")]
    Timeout(Duration),

    /// Status aggregation could not continue
    #[error("Status error: {0}")]
    Status(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn generation(direction: &'static str, source: Error) -> Self {
        Error::Generation {
            direction,
            source: Box::new(source),
        }
    }

    pub fn store(stage: Stage, source: StoreError) -> Self {
        Error::Store { stage, source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for chartflow operations
pub type Result<T> = std::result::Result<T, Error>;
