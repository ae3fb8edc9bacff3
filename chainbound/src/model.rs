//! The model invocation seam.
//!
//! Individual model/tool calls are external collaborators: the pipeline
//! only sees an async capability with a latency and a success/failure
//! outcome. Implementations live outside the crate (HTTP gateways, local
//! runtimes); tests use the scripted client from [`crate::testing`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Errors produced by a model invocation.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The backing service is temporarily unavailable.
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its allotted budget.
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// The model rejected the request (bad input, policy, quota).
    #[error("Model rejected request: {0}")]
    Rejected(String),

    /// The response could not be interpreted.
    #[error("Malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    /// Returns true if an immediate re-invocation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// A single request to a model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// What the model is asked to do.
    pub instruction: String,
    /// The material the instruction applies to.
    pub input: String,
    /// How long the client may spend on this call.
    pub budget: Duration,
}

impl ModelRequest {
    /// Creates a new model request.
    #[must_use]
    pub fn new(instruction: impl Into<String>, input: impl Into<String>, budget: Duration) -> Self {
        Self {
            instruction: instruction.into(),
            input: input.into(),
            budget,
        }
    }
}

/// Capability for invoking an external model.
///
/// Implementations must honor `request.budget` as a ceiling on their own
/// blocking time; the runner additionally hard-bounds every stage, so a
/// client that overruns is abandoned rather than trusted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Performs one completion call.
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError>;
}
