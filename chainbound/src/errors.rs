//! Error types for chain construction and bookkeeping.
//!
//! Stage failures are *not* errors here: stages report them as
//! [`crate::outcome::StageOutcome`] values and the runner decides how
//! to proceed. The types below cover the few places where the crate's
//! own machinery can go wrong.

use thiserror::Error;

/// The umbrella error type for chainbound operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A chain failed validation.
    #[error("{0}")]
    Validation(#[from] ChainValidationError),

    /// A pipeline state invariant was violated.
    #[error("{0}")]
    StateConflict(#[from] StateConflictError),

    /// A model invocation failed.
    #[error("{0}")]
    Model(#[from] crate::model::ModelError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error raised when a chain is malformed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ChainValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved, if any.
    pub stages: Vec<String>,
}

impl ChainValidationError {
    /// Creates a new chain validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Error raised when a stage output would overwrite an existing entry.
///
/// Pipeline state is append-only with one writer per key; hitting this
/// means two stages in one chain share a name.
#[derive(Debug, Clone, Error)]
#[error("State conflict: stage '{stage}' already produced an output")]
pub struct StateConflictError {
    /// The conflicting stage name.
    pub stage: String,
}

impl StateConflictError {
    /// Creates a new state conflict error.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
        }
    }
}
