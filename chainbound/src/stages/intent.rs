//! Intent classification stage.

use super::{model_outcome, Stage};
use crate::context::{PipelineState, RequestContext};
use crate::model::{ModelClient, ModelRequest};
use crate::outcome::{StageKind, StageOutcome};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const INSTRUCTION: &str = "Classify this analysis request. Reply with a single \
line naming the kind of answer the user expects (e.g. direct answer, tabular \
summary, chart description).";

/// Classifies the shape of the incoming request.
///
/// The first stage in every chain. Its output is advisory: downstream
/// stages fall back to the raw prompt when it is missing.
pub struct IntentStage {
    model: Arc<dyn ModelClient>,
}

impl IntentStage {
    /// The pipeline-state key this stage writes under.
    pub const NAME: &'static str = "intent";

    /// Creates an intent stage backed by the given model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

impl fmt::Debug for IntentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentStage").finish()
    }
}

#[async_trait]
impl Stage for IntentStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Intent
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        _state: &PipelineState,
        budget: Duration,
    ) -> StageOutcome {
        let mut input = ctx.prompt().to_string();
        if ctx.has_attachments() {
            input.push_str("\n\nAttached files: ");
            input.push_str(&ctx.attachment_names().join(", "));
        }

        let reply = self
            .model
            .complete(ModelRequest::new(INSTRUCTION, input, budget))
            .await;

        model_outcome(reply, "intent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[tokio::test]
    async fn produces_intent_output() {
        let model = Arc::new(ScriptedModel::replying(["direct answer"]));
        let stage = IntentStage::new(model);
        let ctx = RequestContext::new("What is 2+2?");
        let state = PipelineState::new();

        let outcome = stage.run(&ctx, &state, Duration::from_secs(5)).await;
        match outcome {
            StageOutcome::Ok { output } => assert_eq!(output["intent"], "direct answer"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mentions_attachments_to_the_model() {
        let model = Arc::new(ScriptedModel::replying(["tabular summary"]));
        let stage = IntentStage::new(model.clone());
        let ctx = RequestContext::new("Analyze attached CSV")
            .with_attachment("data.csv", b"a,b\n".to_vec());

        let _ = stage.run(&ctx, &PipelineState::new(), Duration::from_secs(5)).await;

        let seen = model.requests();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].input.contains("data.csv"));
    }
}
