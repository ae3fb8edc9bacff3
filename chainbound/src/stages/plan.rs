//! Plan generation stage.

use super::{model_outcome, Stage};
use crate::context::{PipelineState, RequestContext};
use crate::model::{ModelClient, ModelRequest};
use crate::outcome::{StageKind, StageOutcome};
use crate::stages::IntentStage;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const INSTRUCTION: &str = "Produce a short numbered analysis plan answering the \
request. Each step must be independently executable.";

/// Turns the prompt (plus the classified intent, when available) into
/// an analysis plan for downstream execution.
pub struct PlanStage {
    model: Arc<dyn ModelClient>,
}

impl PlanStage {
    /// The pipeline-state key this stage writes under.
    pub const NAME: &'static str = "plan";

    /// Creates a plan stage backed by the given model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

impl fmt::Debug for PlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanStage").finish()
    }
}

#[async_trait]
impl Stage for PlanStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Plan
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        state: &PipelineState,
        budget: Duration,
    ) -> StageOutcome {
        let mut input = format!("Request:\n{}", ctx.prompt());

        // Intent is advisory; a degraded chain plans from the raw prompt.
        if let Some(intent) = state
            .output(IntentStage::NAME)
            .and_then(|v| v.get("intent"))
            .and_then(|v| v.as_str())
        {
            input.push_str("\n\nExpected answer shape: ");
            input.push_str(intent);
        }

        let reply = self
            .model
            .complete(ModelRequest::new(INSTRUCTION, input, budget))
            .await;

        model_outcome(reply, "plan")
    }
}
