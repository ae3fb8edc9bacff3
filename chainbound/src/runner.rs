//! The pipeline runner: drives a chain of stages under a shared deadline.
//!
//! One runner invocation serves one request. Stages execute in the
//! order the chain builder produced; the deadline is checked before
//! every stage and enforced mid-stage by wrapping each invocation in a
//! timeout. Every terminal state — completed, degraded, timed out — is
//! a flavor of "done" and yields a [`PipelineResult`].

use crate::chain::{validate_chain, ChainBuilder, StageSpec};
use crate::context::{PipelineState, RequestContext};
use crate::deadline::Deadline;
use crate::events::{EventSink, NoOpEventSink};
use crate::finalize::finalize;
use crate::model::ModelClient;
use crate::observability::SpanTimer;
use crate::outcome::{FailureClass, StageFailure, StageOutcome};
use crate::stages::SynthesizeStage;
use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// How long an in-flight stage gets to return a partial result once
/// its ceiling has passed, before it is abandoned outright.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(500);

/// The runner's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Entered with the full chain and deadline; nothing started yet.
    Pending,
    /// Executing the stage at this chain index.
    Running(usize),
    /// Every stage succeeded within budget.
    Completed,
    /// At least one stage failed; the chain continued or aborted.
    Degraded,
    /// The deadline expired before the chain finished.
    TimedOut,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(index) => write!(f, "running({index})"),
            Self::Completed => write!(f, "completed"),
            Self::Degraded => write!(f, "degraded"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// The tagged outcome of one pipeline run, consumed exactly once by
/// the finalizer.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    /// Every stage succeeded.
    Success {
        /// The synthesized answer.
        answer: serde_json::Value,
        /// All completed stage outputs in completion order.
        stages: Vec<(String, serde_json::Value)>,
    },
    /// Some stages failed or the deadline cut the chain short, but
    /// completed outputs still form a best-effort answer.
    Partial {
        /// The best-effort answer.
        answer: serde_json::Value,
        /// All completed stage outputs in completion order.
        stages: Vec<(String, serde_json::Value)>,
        /// What went wrong, per stage.
        failures: Vec<StageFailure>,
    },
    /// Nothing completed.
    Failure {
        /// Why the run produced no answer.
        reason: String,
        /// Whether deadline expiry was the cause.
        timed_out: bool,
    },
}

impl PipelineResult {
    /// Returns true for the fully successful variant.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Drives a chain of stages to a terminal state.
pub struct PipelineRunner {
    events: Arc<dyn EventSink>,
    cancel_grace: Duration,
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRunner {
    /// Creates a runner with no event sink and the default grace period.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(NoOpEventSink),
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the cancellation grace period.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Runs the chain to completion, degradation, or timeout.
    ///
    /// Never panics and never returns early without a result; the
    /// three terminal states differ only in how much of the answer
    /// survived.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        chain: &[StageSpec],
        deadline: &Deadline,
    ) -> PipelineResult {
        let mut state = PipelineState::new();
        let mut machine = RunnerState::Pending;

        if let Err(err) = validate_chain(chain) {
            warn!(error = %err, "refusing to run invalid chain");
            return PipelineResult::Failure {
                reason: err.to_string(),
                timed_out: false,
            };
        }

        self.events.try_emit(
            "pipeline.started",
            Some(json!({
                "request_id": ctx.run_id().request_id.to_string(),
                "state": machine.to_string(),
                "stages": chain.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                "budget_ms": deadline.budget().as_millis() as u64,
            })),
        );

        let mut timed_out = false;

        for (index, spec) in chain.iter().enumerate() {
            if deadline.expired() {
                timed_out = true;
                self.events.try_emit(
                    "pipeline.timeout",
                    Some(json!({
                        "next_stage": spec.name,
                        "elapsed_ms": deadline.elapsed().as_millis() as u64,
                    })),
                );
                break;
            }

            machine = RunnerState::Running(index);
            self.events.try_emit(
                "stage.started",
                Some(json!({
                    "stage": spec.name,
                    "state": machine.to_string(),
                    "remaining_ms": deadline.remaining().as_millis() as u64,
                })),
            );

            let timer = SpanTimer::start(spec.name.clone());
            let (outcome, attempts) = self.run_stage(ctx, &state, spec, deadline).await;
            let duration_ms = timer.finish();

            match outcome {
                StageOutcome::Ok { output } => {
                    self.events.try_emit(
                        "stage.completed",
                        Some(json!({
                            "stage": spec.name,
                            "attempts": attempts,
                            "duration_ms": duration_ms,
                        })),
                    );
                    if let Err(conflict) = state.insert_output(&spec.name, output) {
                        // Unreachable with a validated chain; degrade
                        // instead of clobbering the earlier output.
                        state.record_failure(
                            StageFailure::new(
                                &spec.name,
                                conflict.to_string(),
                                FailureClass::Recoverable,
                            )
                            .with_attempts(attempts),
                        );
                    }
                }
                StageOutcome::Cancelled { reason } => {
                    // Cancellation means pipeline timeout only when the
                    // shared deadline is actually gone; a stage abandoned
                    // at its own ceiling is an ordinary stage failure.
                    if deadline.expired() {
                        timed_out = true;
                        state.record_failure(
                            StageFailure::new(&spec.name, &reason, FailureClass::Recoverable)
                                .with_attempts(attempts),
                        );
                        self.events.try_emit(
                            "pipeline.timeout",
                            Some(json!({"stage": spec.name, "reason": reason})),
                        );
                        break;
                    }
                    state.record_failure(
                        StageFailure::new(&spec.name, &reason, spec.on_failure)
                            .with_attempts(attempts),
                    );
                    self.events.try_emit(
                        "stage.failed",
                        Some(json!({
                            "stage": spec.name,
                            "error": reason,
                            "class": spec.on_failure.to_string(),
                            "attempts": attempts,
                            "duration_ms": duration_ms,
                        })),
                    );
                    if spec.on_failure == FailureClass::Fatal {
                        break;
                    }
                }
                StageOutcome::Fail { error, .. } => {
                    state.record_failure(
                        StageFailure::new(&spec.name, &error, spec.on_failure)
                            .with_attempts(attempts),
                    );
                    self.events.try_emit(
                        "stage.failed",
                        Some(json!({
                            "stage": spec.name,
                            "error": error,
                            "class": spec.on_failure.to_string(),
                            "attempts": attempts,
                            "duration_ms": duration_ms,
                        })),
                    );
                    match spec.on_failure {
                        // Continue with the best available upstream
                        // output; later stages read state directly.
                        FailureClass::Recoverable => {}
                        FailureClass::Fatal => break,
                    }
                }
            }
        }

        let result = if timed_out {
            machine = RunnerState::TimedOut;
            if state.completed_count() == 0 {
                PipelineResult::Failure {
                    reason: "deadline exceeded before any stage completed".to_string(),
                    timed_out: true,
                }
            } else {
                PipelineResult::Partial {
                    answer: assemble_answer(&state),
                    stages: state.outputs().to_vec(),
                    failures: state.failures().to_vec(),
                }
            }
        } else if state.has_failures() {
            machine = RunnerState::Degraded;
            if state.completed_count() == 0 {
                PipelineResult::Failure {
                    reason: summarize_failures(&state),
                    timed_out: false,
                }
            } else {
                PipelineResult::Partial {
                    answer: assemble_answer(&state),
                    stages: state.outputs().to_vec(),
                    failures: state.failures().to_vec(),
                }
            }
        } else {
            machine = RunnerState::Completed;
            PipelineResult::Success {
                answer: assemble_answer(&state),
                stages: state.outputs().to_vec(),
            }
        };

        self.events.try_emit(
            "pipeline.finished",
            Some(json!({
                "state": machine.to_string(),
                "completed_stages": state.completed_count(),
                "failed_stages": state.failures().len(),
                "elapsed_ms": deadline.elapsed().as_millis() as u64,
            })),
        );

        result
    }

    /// Runs a set of independent stages concurrently.
    ///
    /// An optimization for stages with no data dependency between
    /// them: all read the same state snapshot, the runner waits for
    /// all of them (or the shared deadline), and outputs are applied
    /// in spec order afterwards so observable ordering is unchanged.
    pub async fn run_independent(
        &self,
        ctx: &RequestContext,
        state: &mut PipelineState,
        specs: &[StageSpec],
        deadline: &Deadline,
    ) {
        let outcomes: Vec<(StageOutcome, u32)> = {
            let snapshot: &PipelineState = state;
            join_all(specs.iter().map(|spec| async move {
                self.run_stage(ctx, snapshot, spec, deadline).await
            }))
            .await
        };

        for (spec, (outcome, attempts)) in specs.iter().zip(outcomes) {
            match outcome {
                StageOutcome::Ok { output } => {
                    if state.insert_output(&spec.name, output).is_err() {
                        warn!(stage = %spec.name, "duplicate output from independent stage");
                    }
                }
                StageOutcome::Fail { error, .. } => {
                    state.record_failure(
                        StageFailure::new(&spec.name, error, spec.on_failure)
                            .with_attempts(attempts),
                    );
                }
                StageOutcome::Cancelled { reason } => {
                    state.record_failure(
                        StageFailure::new(&spec.name, reason, FailureClass::Recoverable)
                            .with_attempts(attempts),
                    );
                }
            }
        }
    }

    /// Executes one stage with retry, bounded by its ceiling and the
    /// shared deadline. Returns the final outcome and attempt count.
    async fn run_stage(
        &self,
        ctx: &RequestContext,
        state: &PipelineState,
        spec: &StageSpec,
        deadline: &Deadline,
    ) -> (StageOutcome, u32) {
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return (
                    StageOutcome::cancelled("deadline expired before the attempt could start"),
                    attempts,
                );
            }

            let ceiling = spec.ceiling.map_or(remaining, |c| c.min(remaining));
            let hard_bound = ceiling.saturating_add(self.cancel_grace);

            let outcome = match timeout(hard_bound, spec.stage.run(ctx, state, ceiling)).await {
                Ok(outcome) => outcome,
                Err(_) => StageOutcome::cancelled(format!(
                    "stage '{}' exceeded its {}ms ceiling",
                    spec.name,
                    ceiling.as_millis()
                )),
            };

            let transient_error = match &outcome {
                StageOutcome::Fail {
                    error,
                    retryable: true,
                } => Some(error.clone()),
                _ => None,
            };

            if let Some(error) = transient_error {
                if let Some(delay) = spec.retry.permits_retry(attempts, deadline) {
                    self.events.try_emit(
                        "stage.retry",
                        Some(json!({
                            "stage": spec.name,
                            "attempt": attempts,
                            "delay_ms": delay.as_millis() as u64,
                            "error": error,
                        })),
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            return (outcome, attempts);
        }
    }
}

/// Builds the user-facing answer from completed outputs.
///
/// Prefers the synthesized answer; a chain that never reached
/// synthesis exposes the raw stage outputs instead.
fn assemble_answer(state: &PipelineState) -> serde_json::Value {
    if let Some(answer) = state
        .output(SynthesizeStage::NAME)
        .and_then(|v| v.get("answer"))
    {
        return answer.clone();
    }
    let mut map = serde_json::Map::new();
    for (stage, output) in state.outputs() {
        map.insert(stage.clone(), output.clone());
    }
    serde_json::Value::Object(map)
}

fn summarize_failures(state: &PipelineState) -> String {
    let parts: Vec<String> = state
        .failures()
        .iter()
        .map(|f| format!("{}: {}", f.stage, f.error))
        .collect();
    format!("all stages failed ({})", parts.join("; "))
}

/// The assembled pipeline: chain builder plus runner behind the single
/// entry point the transport layer calls.
pub struct AnalysisPipeline {
    builder: ChainBuilder,
    runner: PipelineRunner,
}

impl AnalysisPipeline {
    /// Creates a pipeline whose stages invoke the given model.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            builder: ChainBuilder::new(model),
            runner: PipelineRunner::new(),
        }
    }

    /// Sets the event sink for all runs.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.runner = self.runner.with_event_sink(sink);
        self
    }

    /// Runs one request to a JSON answer.
    ///
    /// The sole entry point: always returns valid JSON within the
    /// deadline's budget plus a bounded cancellation grace period,
    /// no matter how the chain terminated.
    pub async fn run_pipeline(
        &self,
        prompt: impl Into<String>,
        attachments: HashMap<String, Vec<u8>>,
        deadline: &Deadline,
    ) -> String {
        let ctx = RequestContext::new(prompt).with_attachments(attachments);
        let chain = self.builder.build(&ctx);

        info!(
            request_id = %ctx.run_id().request_id,
            stages = chain.len(),
            budget_ms = deadline.budget().as_millis() as u64,
            "running analysis pipeline"
        );

        let result = self.runner.run(&ctx, &chain, deadline).await;
        finalize(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::outcome::StageKind;
    use crate::retry::RetryPolicy;
    use crate::stages::FnStage;
    use crate::testing::{ScriptedStage, SlowStage};
    use pretty_assertions::assert_eq;

    fn ok_spec(name: &'static str) -> StageSpec {
        StageSpec::new(Arc::new(FnStage::new(name, StageKind::Plan, move |_, _| {
            StageOutcome::ok(json!({"step": name}))
        })))
    }

    fn failing_spec(name: &'static str) -> StageSpec {
        StageSpec::new(Arc::new(FnStage::new(name, StageKind::Plan, |_, _| {
            StageOutcome::fail("boom")
        })))
        .with_retry(RetryPolicy::none())
    }

    fn ctx() -> RequestContext {
        RequestContext::new("What is 2+2?")
    }

    #[tokio::test]
    async fn all_success_chain_completes_in_order() {
        let runner = PipelineRunner::new();
        let chain = vec![ok_spec("a"), ok_spec("b"), ok_spec("c")];
        let deadline = Deadline::new(Duration::from_secs(300));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Success { stages, .. } => {
                let names: Vec<&str> = stages.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["a", "b", "c"]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recoverable_failure_degrades_and_continues() {
        let runner = PipelineRunner::new();
        let chain = vec![ok_spec("a"), failing_spec("b"), ok_spec("c")];
        let deadline = Deadline::new(Duration::from_secs(300));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Partial { stages, failures, .. } => {
                let names: Vec<&str> = stages.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["a", "c"]);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stage, "b");
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_failure_stops_the_chain() {
        let runner = PipelineRunner::new();
        let chain = vec![ok_spec("a"), failing_spec("b").fatal(), ok_spec("c")];
        let deadline = Deadline::new(Duration::from_secs(200));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Partial { stages, failures, .. } => {
                let names: Vec<&str> = stages.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["a"]);
                assert_eq!(failures[0].stage, "b");
                assert_eq!(failures[0].class, FailureClass::Fatal);
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_deadline_runs_zero_stages() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = PipelineRunner::new().with_event_sink(sink.clone());
        let chain = vec![ok_spec("a")];
        let deadline = Deadline::new(Duration::ZERO);

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Failure { timed_out, .. } => assert!(timed_out),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(sink.events_of_type("stage.started").is_empty());
        assert_eq!(sink.events_of_type("pipeline.timeout").len(), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_a_validation_failure() {
        let runner = PipelineRunner::new();
        let deadline = Deadline::new(Duration::from_secs(10));

        let result = runner.run(&ctx(), &[], &deadline).await;
        match result {
            PipelineResult::Failure { reason, timed_out } => {
                assert!(!timed_out);
                assert!(reason.contains("no stages"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_to_success() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = PipelineRunner::new().with_event_sink(sink.clone());

        let flaky = ScriptedStage::new("flaky", StageKind::Execute)
            .then(StageOutcome::fail_retryable("503"))
            .then(StageOutcome::ok(json!({"result": "recovered"})));
        let chain = vec![StageSpec::new(Arc::new(flaky)).with_retry(
            RetryPolicy::default()
                .with_max_attempts(3)
                .with_base_delay_ms(1),
        )];
        let deadline = Deadline::new(Duration::from_secs(300));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        assert!(result.is_success());
        assert_eq!(sink.events_of_type("stage.retry").len(), 1);
    }

    #[tokio::test]
    async fn retries_exhaust_into_recorded_failure() {
        let runner = PipelineRunner::new();
        let flaky = ScriptedStage::new("flaky", StageKind::Execute)
            .then(StageOutcome::fail_retryable("503"))
            .then(StageOutcome::fail_retryable("503"))
            .then(StageOutcome::fail_retryable("503"));
        let chain = vec![
            ok_spec("a"),
            StageSpec::new(Arc::new(flaky)).with_retry(
                RetryPolicy::default()
                    .with_max_attempts(3)
                    .with_base_delay_ms(1),
            ),
        ];
        let deadline = Deadline::new(Duration::from_secs(300));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Partial { failures, .. } => {
                assert_eq!(failures[0].stage, "flaky");
                assert_eq!(failures[0].attempts, 3);
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_stage_is_abandoned_at_its_ceiling() {
        let runner = PipelineRunner::new().with_cancel_grace(Duration::from_millis(10));
        let chain = vec![
            ok_spec("a"),
            StageSpec::new(Arc::new(SlowStage::new(
                "slow",
                StageKind::Execute,
                Duration::from_secs(3600),
            ))),
        ];
        let deadline = Deadline::new(Duration::from_secs(2));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Partial { stages, failures, .. } => {
                assert_eq!(stages.len(), 1);
                assert_eq!(failures[0].stage, "slow");
                assert!(failures[0].error.contains("ceiling"));
            }
            other => panic!("expected partial, got {other:?}"),
        }
        assert!(deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_overrun_with_budget_left_is_a_stage_failure() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = PipelineRunner::new()
            .with_event_sink(sink.clone())
            .with_cancel_grace(Duration::from_millis(10));
        let chain = vec![
            StageSpec::new(Arc::new(SlowStage::new(
                "slow",
                StageKind::Execute,
                Duration::from_secs(3600),
            )))
            .with_ceiling(Duration::from_secs(1)),
            ok_spec("after"),
        ];
        let deadline = Deadline::new(Duration::from_secs(300));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Partial { stages, failures, .. } => {
                let names: Vec<&str> = stages.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["after"]);
                assert_eq!(failures[0].stage, "slow");
                assert!(failures[0].error.contains("ceiling"));
            }
            other => panic!("expected partial, got {other:?}"),
        }

        // The shared deadline was barely touched; this is a stage
        // failure, not a pipeline timeout.
        assert!(!deadline.expired());
        assert!(sink.events_of_type("pipeline.timeout").is_empty());
        assert_eq!(sink.events_of_type("stage.failed").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_ceiling_overrun_stops_the_chain() {
        let runner = PipelineRunner::new().with_cancel_grace(Duration::from_millis(10));
        let chain = vec![
            StageSpec::new(Arc::new(SlowStage::new(
                "slow",
                StageKind::Execute,
                Duration::from_secs(3600),
            )))
            .with_ceiling(Duration::from_secs(1))
            .fatal(),
            ok_spec("after"),
        ];
        let deadline = Deadline::new(Duration::from_secs(300));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Failure { reason, timed_out } => {
                assert!(!timed_out);
                assert!(reason.contains("slow"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stage_events_carry_durations() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = PipelineRunner::new().with_event_sink(sink.clone());
        let chain = vec![ok_spec("a"), failing_spec("b")];
        let deadline = Deadline::new(Duration::from_secs(60));

        let _ = runner.run(&ctx(), &chain, &deadline).await;

        let completed = sink.events_of_type("stage.completed");
        assert_eq!(completed.len(), 1);
        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);

        for event in completed.iter().chain(failed.iter()) {
            let data = event.data.as_ref().expect("stage events carry data");
            assert!(data["duration_ms"].is_number());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_stage_starts_after_expiry() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = PipelineRunner::new()
            .with_event_sink(sink.clone())
            .with_cancel_grace(Duration::from_millis(10));
        let chain = vec![
            StageSpec::new(Arc::new(SlowStage::new(
                "slow",
                StageKind::Plan,
                Duration::from_secs(60),
            ))),
            ok_spec("after"),
        ];
        let deadline = Deadline::new(Duration::from_secs(1));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        match result {
            PipelineResult::Failure { timed_out, .. } => assert!(timed_out),
            other => panic!("expected failure, got {other:?}"),
        }

        let started = sink.events_of_type("stage.started");
        assert_eq!(started.len(), 1);
    }

    #[tokio::test]
    async fn per_stage_ceiling_clamps_to_remaining_budget() {
        let runner = PipelineRunner::new();
        let budget_probe = FnStage::new("probe", StageKind::Plan, |_, _| {
            StageOutcome::ok(json!(null))
        });
        // Ceiling far above the deadline budget; the stage must still
        // be handed no more than the remaining allowance.
        let chain =
            vec![StageSpec::new(Arc::new(budget_probe)).with_ceiling(Duration::from_secs(3600))];
        let deadline = Deadline::new(Duration::from_millis(200));

        let result = runner.run(&ctx(), &chain, &deadline).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn independent_stages_apply_outputs_in_spec_order() {
        let runner = PipelineRunner::new();
        let specs = vec![ok_spec("x"), ok_spec("y")];
        let mut state = PipelineState::new();
        let deadline = Deadline::new(Duration::from_secs(60));

        runner
            .run_independent(&ctx(), &mut state, &specs, &deadline)
            .await;

        let names: Vec<&str> = state.outputs().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn independent_stage_failure_is_recorded_not_fatal() {
        let runner = PipelineRunner::new();
        let specs = vec![ok_spec("x"), failing_spec("y")];
        let mut state = PipelineState::new();
        let deadline = Deadline::new(Duration::from_secs(60));

        runner
            .run_independent(&ctx(), &mut state, &specs, &deadline)
            .await;

        assert_eq!(state.completed_count(), 1);
        assert_eq!(state.failures()[0].stage, "y");
    }
}
