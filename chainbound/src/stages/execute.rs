//! Plan execution stage for data-aware chains.

use super::{model_outcome, Stage};
use crate::context::{PipelineState, RequestContext};
use crate::model::{ModelClient, ModelRequest};
use crate::outcome::{StageKind, StageOutcome};
use crate::stages::PlanStage;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const INSTRUCTION: &str = "Execute the analysis plan against the attached data \
and report the intermediate results, one per plan step.";

/// Attachment bytes beyond this are summarized by size rather than
/// inlined into the model input.
const INLINE_LIMIT: usize = 16 * 1024;

/// Runs the generated plan against the attached data files.
///
/// Only built into chains for requests that carry attachments.
pub struct ExecuteStage {
    model: Arc<dyn ModelClient>,
}

impl ExecuteStage {
    /// The pipeline-state key this stage writes under.
    pub const NAME: &'static str = "execute";

    /// Creates an execute stage backed by the given model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    fn describe_attachments(ctx: &RequestContext) -> String {
        let mut description = String::new();
        for name in ctx.attachment_names() {
            let Some(bytes) = ctx.attachment(name) else {
                continue;
            };
            if bytes.len() <= INLINE_LIMIT {
                description.push_str(&format!(
                    "--- {} ({} bytes) ---\n{}\n",
                    name,
                    bytes.len(),
                    String::from_utf8_lossy(bytes)
                ));
            } else {
                description.push_str(&format!("--- {} ({} bytes, omitted) ---\n", name, bytes.len()));
            }
        }
        description
    }
}

impl fmt::Debug for ExecuteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteStage").finish()
    }
}

#[async_trait]
impl Stage for ExecuteStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Execute
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        state: &PipelineState,
        budget: Duration,
    ) -> StageOutcome {
        let plan = state
            .output(PlanStage::NAME)
            .and_then(|v| v.get("plan"))
            .and_then(|v| v.as_str())
            // Degraded chain: execute straight from the request.
            .unwrap_or(ctx.prompt());

        let input = format!(
            "Plan:\n{plan}\n\nData:\n{}",
            Self::describe_attachments(ctx)
        );

        let reply = self
            .model
            .complete(ModelRequest::new(INSTRUCTION, input, budget))
            .await;

        model_outcome(reply, "result")
    }
}
