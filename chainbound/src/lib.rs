//! # Chainbound
//!
//! A deadline-bounded pipeline orchestrator for model-backed analysis.
//!
//! Chainbound accepts a prompt with optional in-memory attachments,
//! drives a chain of heterogeneous stages (intent classification,
//! planning, execution, synthesis) under one shared wall-clock budget,
//! and always returns a valid JSON response:
//!
//! - **Shared deadline**: every stage sees the same shrinking budget;
//!   no stage starts after expiry and overruns are abandoned
//! - **Failure isolation**: recoverable stage failures degrade the
//!   result, fatal ones stop the chain, neither escapes as a panic
//! - **Bounded retries**: transient failures are retried with backoff
//!   only while the remaining budget still permits a useful attempt
//! - **Guaranteed JSON**: success, partial, failed, and timeout results
//!   all serialize to the same well-formed response schema
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainbound::prelude::*;
//! use std::collections::HashMap;
//!
//! let pipeline = AnalysisPipeline::new(model);
//! let deadline = Config::from_env()?.deadline();
//! let body = pipeline
//!     .run_pipeline("What is 2+2?", HashMap::new(), deadline)
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chain;
pub mod config;
pub mod context;
pub mod deadline;
pub mod errors;
pub mod events;
pub mod finalize;
pub mod model;
pub mod observability;
pub mod outcome;
pub mod retry;
pub mod runner;
pub mod stages;
pub mod testing;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{validate_chain, ChainBuilder, StageSpec};
    pub use crate::config::Config;
    pub use crate::context::{PipelineState, RequestContext, RunIdentity};
    pub use crate::deadline::Deadline;
    pub use crate::errors::{ChainError, ChainValidationError, StateConflictError};
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent,
    };
    pub use crate::finalize::finalize;
    pub use crate::model::{ModelClient, ModelError, ModelRequest};
    pub use crate::outcome::{FailureClass, StageFailure, StageKind, StageOutcome};
    pub use crate::retry::RetryPolicy;
    pub use crate::runner::{
        AnalysisPipeline, PipelineResult, PipelineRunner, RunnerState,
    };
    pub use crate::stages::{
        ExecuteStage, FnStage, IntentStage, PlanStage, Stage, SynthesizeStage,
    };
}
