//! Stage trait and the concrete model-backed stage variants.
//!
//! Stages are the units of work in a chain. Each receives the request
//! context, a read-only view of upstream outputs, and the slice of the
//! budget it may spend; it reports back an explicit
//! [`StageOutcome`](crate::outcome::StageOutcome) and never leaves
//! partial shared state behind.

mod execute;
mod intent;
mod plan;
mod synthesize;

pub use execute::ExecuteStage;
pub use intent::IntentStage;
pub use plan::PlanStage;
pub use synthesize::SynthesizeStage;

use crate::context::{PipelineState, RequestContext};
use crate::model::ModelError;
use crate::outcome::{StageKind, StageOutcome};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Trait for pipeline stages.
///
/// A stage must not block beyond the `budget` it is handed; the runner
/// additionally hard-bounds every invocation, so an overrunning stage
/// is abandoned at its ceiling plus a short grace period.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stage's name, used as its pipeline-state key.
    fn name(&self) -> &str;

    /// Returns the kind of work this stage performs.
    fn kind(&self) -> StageKind;

    /// Executes the stage within the given budget.
    async fn run(
        &self,
        ctx: &RequestContext,
        state: &PipelineState,
        budget: Duration,
    ) -> StageOutcome;
}

/// Converts a model reply into a stage outcome under the given key.
///
/// Transient model errors become retryable failures; permanent ones do
/// not.
pub(crate) fn model_outcome(reply: Result<String, ModelError>, key: &str) -> StageOutcome {
    match reply {
        Ok(text) => StageOutcome::ok(serde_json::json!({ key: text.trim() })),
        Err(err) if err.is_retryable() => StageOutcome::fail_retryable(err.to_string()),
        Err(err) => StageOutcome::fail(err.to_string()),
    }
}

/// A function-backed stage, mainly for tests and custom chains.
pub struct FnStage<F>
where
    F: Fn(&RequestContext, &PipelineState) -> StageOutcome + Send + Sync,
{
    name: String,
    kind: StageKind,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&RequestContext, &PipelineState) -> StageOutcome + Send + Sync,
{
    /// Creates a new function-backed stage.
    pub fn new(name: impl Into<String>, kind: StageKind, func: F) -> Self {
        Self {
            name: name.into(),
            kind,
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&RequestContext, &PipelineState) -> StageOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&RequestContext, &PipelineState) -> StageOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        state: &PipelineState,
        _budget: Duration,
    ) -> StageOutcome {
        (self.func)(ctx, state)
    }
}
