//! Stage outcome values and failure records.
//!
//! Stages report success and failure as explicit values rather than
//! unwinding, which keeps the runner's state machine exhaustive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
///
/// Heterogeneous model calls are represented as tagged variants so the
/// runner can drive them uniformly and new kinds slot in without
/// touching the driving loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Classifies the shape of the incoming request.
    Intent,
    /// Produces an analysis plan from the prompt.
    Plan,
    /// Executes the plan against attached data.
    Execute,
    /// Composes the final answer from upstream outputs.
    Synthesize,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::Plan => write!(f, "plan"),
            Self::Execute => write!(f, "execute"),
            Self::Synthesize => write!(f, "synthesize"),
        }
    }
}

/// Whether a stage failure aborts the chain or degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The chain continues with the best available upstream output.
    #[default]
    Recoverable,
    /// No further stages start; completed outputs still contribute.
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "recoverable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// The result of a single stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage completed and produced an output value.
    Ok {
        /// The produced output.
        output: serde_json::Value,
    },
    /// The stage failed with an explicit error.
    Fail {
        /// Human-readable error description.
        error: String,
        /// Whether an immediate re-invocation may succeed.
        retryable: bool,
    },
    /// The stage was cancelled before it could finish.
    Cancelled {
        /// Why the stage was cancelled.
        reason: String,
    },
}

impl StageOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(output: serde_json::Value) -> Self {
        Self::Ok { output }
    }

    /// Creates a permanent failure outcome.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail {
            error: error.into(),
            retryable: false,
        }
    }

    /// Creates a transient failure outcome.
    #[must_use]
    pub fn fail_retryable(error: impl Into<String>) -> Self {
        Self::Fail {
            error: error.into(),
            retryable: true,
        }
    }

    /// Creates a cancelled outcome.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns true for a successful outcome.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Returns true for a failure that may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fail { retryable: true, .. })
    }
}

/// Record of a stage failure, kept in pipeline state for diagnostics
/// and surfaced in the final JSON as a degradation annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFailure {
    /// The failed stage's name.
    pub stage: String,
    /// The last error observed.
    pub error: String,
    /// How the failure was classified.
    pub class: FailureClass,
    /// Number of attempts made before giving up.
    pub attempts: u32,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl StageFailure {
    /// Creates a failure record stamped with the current time.
    #[must_use]
    pub fn new(stage: impl Into<String>, error: impl Into<String>, class: FailureClass) -> Self {
        Self {
            stage: stage.into(),
            error: error.into(),
            class,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
