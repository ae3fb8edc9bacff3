//! Answer synthesis stage.

use super::{model_outcome, Stage};
use crate::context::{PipelineState, RequestContext};
use crate::model::{ModelClient, ModelRequest};
use crate::outcome::{StageKind, StageOutcome};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const INSTRUCTION: &str = "Compose the final answer to the request from the \
working notes below. Be direct and complete.";

const DEGRADED_INSTRUCTION: &str = "Answer the request directly and concisely. \
No working notes are available.";

/// Composes the final answer from whatever upstream outputs exist.
///
/// The last stage in every chain. When upstream stages failed it
/// degrades to answering from the prompt alone rather than refusing.
pub struct SynthesizeStage {
    model: Arc<dyn ModelClient>,
}

impl SynthesizeStage {
    /// The pipeline-state key this stage writes under.
    pub const NAME: &'static str = "synthesize";

    /// Creates a synthesis stage backed by the given model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

impl fmt::Debug for SynthesizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizeStage").finish()
    }
}

#[async_trait]
impl Stage for SynthesizeStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Synthesize
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        state: &PipelineState,
        budget: Duration,
    ) -> StageOutcome {
        let mut notes = String::new();
        for (stage, output) in state.outputs() {
            notes.push_str(&format!("[{stage}]\n{output}\n\n"));
        }

        let (instruction, input) = if notes.is_empty() {
            (DEGRADED_INSTRUCTION, format!("Request:\n{}", ctx.prompt()))
        } else {
            (
                INSTRUCTION,
                format!("Request:\n{}\n\nWorking notes:\n{notes}", ctx.prompt()),
            )
        };

        let reply = self
            .model
            .complete(ModelRequest::new(instruction, input, budget))
            .await;

        model_outcome(reply, "answer")
    }
}
