//! Deterministic test doubles.
//!
//! Scripted stand-ins for the model client and for stages, so tests can
//! drive the runner through exact success/failure/latency sequences
//! without touching any external service.

use crate::context::{PipelineState, RequestContext};
use crate::model::{ModelClient, ModelError, ModelRequest};
use crate::outcome::{StageKind, StageOutcome};
use crate::stages::Stage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// A model client that replays a fixed script of replies.
///
/// Each call to [`ModelClient::complete`] consumes the next reply and
/// records the request for later inspection. An exhausted script yields
/// [`ModelError::Unavailable`], which surfaces quickly in tests that
/// under-provision replies.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    /// Creates a client with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that returns the given replies in order.
    #[must_use]
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns every request seen so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many calls have been made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("replies_left", &self.replies.lock().len())
            .field("calls", &self.requests.lock().len())
            .finish()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| ModelError::Unavailable("scripted replies exhausted".to_string()))
    }
}

/// A stage that replays a fixed script of outcomes.
///
/// Each run consumes the next outcome, which makes retry sequences
/// (fail, fail, succeed) trivial to express.
pub struct ScriptedStage {
    name: String,
    kind: StageKind,
    outcomes: Mutex<VecDeque<StageOutcome>>,
}

impl ScriptedStage {
    /// Creates a stage with an empty script.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends the outcome the next unscripted run will return.
    #[must_use]
    pub fn then(self, outcome: StageOutcome) -> Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    /// Returns how many scripted outcomes remain.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.outcomes.lock().len()
    }
}

impl fmt::Debug for ScriptedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("remaining", &self.outcomes.lock().len())
            .finish()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(
        &self,
        _ctx: &RequestContext,
        _state: &PipelineState,
        _budget: Duration,
    ) -> StageOutcome {
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| StageOutcome::fail("scripted outcomes exhausted"))
    }
}

/// A stage that sleeps for a fixed duration before succeeding.
///
/// Pairs with `#[tokio::test(start_paused = true)]` to exercise ceiling
/// and cancellation paths without real waiting.
pub struct SlowStage {
    name: String,
    kind: StageKind,
    delay: Duration,
}

impl SlowStage {
    /// Creates a stage that takes `delay` to complete.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, delay: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            delay,
        }
    }
}

impl fmt::Debug for SlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(
        &self,
        _ctx: &RequestContext,
        _state: &PipelineState,
        _budget: Duration,
    ) -> StageOutcome {
        tokio::time::sleep(self.delay).await;
        StageOutcome::ok(serde_json::json!({ "result": self.name.clone() }))
    }
}
