//! Error types for the dispatch system

use crate::core::aggregate::AggregatedError;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur in the dispatch system
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// No processor was supplied at construction time
    #[error("processor is not set")]
    MissingProcessor,

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Processing of a single element failed
    #[error("{message}")]
    Element {
        /// Error message
        message: String,
    },

    /// One or more elements of a run failed
    #[error(transparent)]
    Failed(#[from] AggregatedError),

    /// Failed to spawn a worker thread with details
    #[error("Failed to spawn worker thread #{worker_id}: {message}")]
    SpawnError {
        /// ID of the worker that failed to spawn
        worker_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{worker_id}: {message}")]
    JoinError {
        /// ID of the worker that failed to join
        worker_id: usize,
        /// Error message
        message: String,
    },
}

impl DispatchError {
    /// Create an element failure, the usual error returned from `Processor::process`
    pub fn element(message: impl Into<String>) -> Self {
        DispatchError::Element {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        DispatchError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        worker_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        DispatchError::SpawnError {
            worker_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(worker_id: usize, message: impl Into<String>) -> Self {
        DispatchError::JoinError {
            worker_id,
            message: message.into(),
        }
    }

    /// The aggregated element failures, if this is the result of a failed run
    pub fn as_aggregated(&self) -> Option<&AggregatedError> {
        match self {
            DispatchError::Failed(aggregated) => Some(aggregated),
            _ => None,
        }
    }
}
