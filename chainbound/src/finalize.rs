//! Result finalization: every pipeline result becomes valid JSON.
//!
//! This is the last line of defense. Whatever happened upstream, the
//! HTTP boundary receives a parseable JSON body with an explicit
//! `status` field so callers can tell partial-quality answers from
//! hard failures without parsing free text.

use crate::runner::PipelineResult;
use serde_json::json;
use tracing::error;

/// Emitted when even serialization of the result fails.
const FALLBACK_JSON: &str = r#"{"status":"failed","error":"internal serialization failure"}"#;

/// Serializes a pipeline result into the response JSON.
///
/// Never fails. Schema:
/// - `status`: `"success"`, `"partial"`, `"failed"`, or `"timeout"`.
/// - `answer`: present on success and partial results.
/// - `stages`: completed stage outputs keyed by stage name.
/// - `degraded_stages` / `failures`: present on partial results.
/// - `error`: present on failed and timeout results.
#[must_use]
pub fn finalize(result: &PipelineResult) -> String {
    let value = match result {
        PipelineResult::Success { answer, stages } => json!({
            "status": "success",
            "answer": answer,
            "stages": stage_map(stages),
        }),
        PipelineResult::Partial {
            answer,
            stages,
            failures,
        } => {
            let degraded: Vec<&str> = failures.iter().map(|f| f.stage.as_str()).collect();
            json!({
                "status": "partial",
                "answer": answer,
                "stages": stage_map(stages),
                "degraded_stages": degraded,
                "failures": failures,
            })
        }
        PipelineResult::Failure { reason, timed_out } => json!({
            "status": if *timed_out { "timeout" } else { "failed" },
            "error": reason,
        }),
    };

    serde_json::to_string(&value).unwrap_or_else(|err| {
        error!(error = %err, "failed to serialize pipeline result");
        FALLBACK_JSON.to_string()
    })
}

fn stage_map(stages: &[(String, serde_json::Value)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, output) in stages {
        map.insert(name.clone(), output.clone());
    }
    serde_json::Value::Object(map)
}
