//! Chain assembly: stage descriptors and the chain builder.

use crate::context::RequestContext;
use crate::errors::ChainValidationError;
use crate::model::ModelClient;
use crate::outcome::FailureClass;
use crate::retry::RetryPolicy;
use crate::stages::{ExecuteStage, IntentStage, PlanStage, Stage, SynthesizeStage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Descriptor for one stage in a chain: the stage itself plus the
/// runner-facing policy knobs.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The stage name, mirrored from the stage for diagnostics.
    pub name: String,
    /// The unit of work.
    pub stage: Arc<dyn Stage>,
    /// Optional per-stage ceiling; always clamped to the remaining
    /// deadline at execution time.
    pub ceiling: Option<Duration>,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Whether a terminal failure aborts the chain or degrades it.
    pub on_failure: FailureClass,
}

impl StageSpec {
    /// Creates a spec with default policy: no ceiling, default retries,
    /// recoverable failure.
    #[must_use]
    pub fn new(stage: Arc<dyn Stage>) -> Self {
        Self {
            name: stage.name().to_string(),
            stage,
            ceiling: None,
            retry: RetryPolicy::default(),
            on_failure: FailureClass::Recoverable,
        }
    }

    /// Sets the per-stage timeout ceiling.
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Classifies this stage's failures as fatal.
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.on_failure = FailureClass::Fatal;
        self
    }

    /// Classifies this stage's failures as recoverable.
    #[must_use]
    pub fn recoverable(mut self) -> Self {
        self.on_failure = FailureClass::Recoverable;
        self
    }
}

/// Validates a chain: non-empty, unique stage names.
///
/// # Errors
///
/// Returns [`ChainValidationError`] describing the first violation.
pub fn validate_chain(chain: &[StageSpec]) -> Result<(), ChainValidationError> {
    if chain.is_empty() {
        return Err(ChainValidationError::new("chain has no stages"));
    }
    let mut seen = HashSet::new();
    for spec in chain {
        if !seen.insert(spec.name.as_str()) {
            return Err(
                ChainValidationError::new(format!("duplicate stage name '{}'", spec.name))
                    .with_stages(vec![spec.name.clone()]),
            );
        }
    }
    Ok(())
}

/// Assembles the stage sequence for a request.
///
/// Composition depends only on the static request shape, so identical
/// contexts always produce identical chains: attachments select the
/// data-aware branch (intent, plan, execute, synthesize), their absence
/// the shorter text-only branch (intent, plan, synthesize).
pub struct ChainBuilder {
    model: Arc<dyn ModelClient>,
}

impl ChainBuilder {
    /// Creates a builder whose stages invoke the given model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Builds the chain for a request.
    #[must_use]
    pub fn build(&self, ctx: &RequestContext) -> Vec<StageSpec> {
        let mut chain = vec![
            StageSpec::new(Arc::new(IntentStage::new(self.model.clone())))
                .with_retry(RetryPolicy::default().with_max_attempts(2)),
            StageSpec::new(Arc::new(PlanStage::new(self.model.clone())))
                .with_retry(RetryPolicy::default().with_max_attempts(2)),
        ];

        if ctx.has_attachments() {
            // Execution is the heavy stage; it gets the most retries.
            chain.push(
                StageSpec::new(Arc::new(ExecuteStage::new(self.model.clone())))
                    .with_retry(RetryPolicy::default().with_max_attempts(3)),
            );
        }

        chain.push(
            StageSpec::new(Arc::new(SynthesizeStage::new(self.model.clone())))
                .with_retry(RetryPolicy::default().with_max_attempts(2)),
        );

        chain
    }
}
