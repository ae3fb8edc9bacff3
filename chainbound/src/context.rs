//! Per-request context and the append-only pipeline state.

use crate::errors::StateConflictError;
use crate::outcome::StageFailure;
use std::collections::HashMap;
use uuid::Uuid;

/// Identity of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunIdentity {
    /// The request this run serves.
    pub request_id: Uuid,
}

impl RunIdentity {
    /// Creates a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
        }
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// The validated inputs of one analysis request.
///
/// Immutable once constructed; the prompt is guaranteed non-empty by
/// the HTTP boundary. Attachments are kept in memory and never
/// persisted. Attachments no stage consumes are simply retained here
/// and ignored.
#[derive(Debug, Clone)]
pub struct RequestContext {
    prompt: String,
    attachments: HashMap<String, Vec<u8>>,
    run_id: RunIdentity,
}

impl RequestContext {
    /// Creates a context for a text-only request.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: HashMap::new(),
            run_id: RunIdentity::new(),
        }
    }

    /// Adds a single attachment.
    #[must_use]
    pub fn with_attachment(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachments.insert(name.into(), bytes);
        self
    }

    /// Replaces the attachment map wholesale.
    #[must_use]
    pub fn with_attachments(mut self, attachments: HashMap<String, Vec<u8>>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Returns the prompt text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns true if any data files were attached.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Looks up an attachment by field name.
    #[must_use]
    pub fn attachment(&self, name: &str) -> Option<&[u8]> {
        self.attachments.get(name).map(Vec::as_slice)
    }

    /// Returns attachment names sorted for deterministic iteration.
    #[must_use]
    pub fn attachment_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attachments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the run identity.
    #[must_use]
    pub fn run_id(&self) -> RunIdentity {
        self.run_id
    }
}

/// Accumulator of completed stage outputs for one request.
///
/// Append-only, single writer (the runner), no cross-request sharing.
/// Outputs keep completion order; each stage owns a disjoint key.
#[derive(Debug, Default)]
pub struct PipelineState {
    outputs: Vec<(String, serde_json::Value)>,
    failures: Vec<StageFailure>,
}

impl PipelineState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed stage's output.
    ///
    /// # Errors
    ///
    /// Returns [`StateConflictError`] if the stage already has an entry.
    pub fn insert_output(
        &mut self,
        stage: impl Into<String>,
        output: serde_json::Value,
    ) -> Result<(), StateConflictError> {
        let stage = stage.into();
        if self.output(&stage).is_some() {
            return Err(StateConflictError::new(stage));
        }
        self.outputs.push((stage, output));
        Ok(())
    }

    /// Looks up the output of a completed stage.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&serde_json::Value> {
        self.outputs
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, value)| value)
    }

    /// Returns all outputs in completion order.
    #[must_use]
    pub fn outputs(&self) -> &[(String, serde_json::Value)] {
        &self.outputs
    }

    /// Returns the most recently completed output, if any.
    ///
    /// This is the "best available upstream output" a degraded chain
    /// falls back to when a stage in the middle fails.
    #[must_use]
    pub fn latest_output(&self) -> Option<&serde_json::Value> {
        self.outputs.last().map(|(_, value)| value)
    }

    /// Records a stage failure.
    pub fn record_failure(&mut self, failure: StageFailure) {
        self.failures.push(failure);
    }

    /// Returns all recorded failures.
    #[must_use]
    pub fn failures(&self) -> &[StageFailure] {
        &self.failures
    }

    /// Returns true if any stage failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns the number of completed stages.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.outputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureClass;
    use pretty_assertions::assert_eq;

    #[test]
    fn context_builder() {
        let ctx = RequestContext::new("Analyze attached CSV")
            .with_attachment("data.csv", b"a,b\n1,2\n".to_vec());

        assert_eq!(ctx.prompt(), "Analyze attached CSV");
        assert!(ctx.has_attachments());
        assert_eq!(ctx.attachment("data.csv"), Some(b"a,b\n1,2\n".as_slice()));
        assert!(ctx.attachment("missing.csv").is_none());
    }

    #[test]
    fn attachment_names_are_sorted() {
        let ctx = RequestContext::new("p")
            .with_attachment("b.csv", vec![])
            .with_attachment("a.csv", vec![]);

        assert_eq!(ctx.attachment_names(), vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn each_context_gets_a_distinct_run_id() {
        let a = RequestContext::new("x");
        let b = RequestContext::new("x");
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn state_preserves_completion_order() {
        let mut state = PipelineState::new();
        state.insert_output("intent", serde_json::json!("text_only")).unwrap();
        state.insert_output("plan", serde_json::json!("steps")).unwrap();

        let names: Vec<&str> = state.outputs().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["intent", "plan"]);
        assert_eq!(state.completed_count(), 2);
    }

    #[test]
    fn state_rejects_duplicate_keys() {
        let mut state = PipelineState::new();
        state.insert_output("intent", serde_json::json!(1)).unwrap();

        let err = state.insert_output("intent", serde_json::json!(2)).unwrap_err();
        assert_eq!(err.stage, "intent");
        assert_eq!(state.output("intent"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn latest_output_tracks_the_tail() {
        let mut state = PipelineState::new();
        assert!(state.latest_output().is_none());

        state.insert_output("intent", serde_json::json!("a")).unwrap();
        state.insert_output("plan", serde_json::json!("b")).unwrap();

        assert_eq!(state.latest_output(), Some(&serde_json::json!("b")));
    }

    #[test]
    fn failures_accumulate() {
        let mut state = PipelineState::new();
        assert!(!state.has_failures());

        state.record_failure(StageFailure::new("plan", "boom", FailureClass::Recoverable));

        assert!(state.has_failures());
        assert_eq!(state.failures().len(), 1);
    }
}
