//! Execution trace entries recorded by the workflow engine

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::types::Timestamp;

/// A workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    InterpretQuery,
    ValidateTask,
    RetrieveData,
    ExecuteAnalytics,
    GenerateExplanation,
    HandleError,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::InterpretQuery => "interpret_query",
            Step::ValidateTask => "validate_task",
            Step::RetrieveData => "retrieve_data",
            Step::ExecuteAnalytics => "execute_analytics",
            Step::GenerateExplanation => "generate_explanation",
            Step::HandleError => "handle_error",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Started => "started",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            StepStatus::Started => "→",
            StepStatus::Completed => "✓",
            StepStatus::Failed => "✗",
        }
    }
}

/// One timestamped record of a step's entry or exit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub step: Step,
    pub timestamp: Timestamp,
    pub status: StepStatus,
    pub details: Map<String, Value>,
    /// Milliseconds since the step's `started` entry; 0 on the entry itself
    pub duration_ms: Option<f64>,
}

/// Measures a running step
#[derive(Debug)]
pub struct StepTimer {
    step: Step,
    started: Instant,
}

impl StepTimer {
    pub fn start(step: Step) -> Self {
        Self {
            step,
            started: Instant::now(),
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

impl TraceEntry {
    pub fn started(step: Step, details: Map<String, Value>) -> Self {
        Self {
            step,
            timestamp: Utc::now(),
            status: StepStatus::Started,
            details,
            duration_ms: Some(0.0),
        }
    }

    pub fn finished(timer: &StepTimer, status: StepStatus, details: Map<String, Value>) -> Self {
        Self {
            step: timer.step(),
            timestamp: Utc::now(),
            status,
            details,
            duration_ms: Some(timer.elapsed_ms()),
        }
    }

    /// The `error` detail of a failed entry, if any
    pub fn error(&self) -> Option<&str> {
        self.details.get("error").and_then(Value::as_str)
    }
}

/// Turn a `json!` object into a detail map; anything else becomes empty
pub fn details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_names() {
        assert_eq!(Step::InterpretQuery.to_string(), "interpret_query");
        assert_eq!(
            serde_json::to_value(Step::GenerateExplanation).unwrap(),
            json!("generate_explanation")
        );
        assert_eq!(serde_json::to_value(StepStatus::Failed).unwrap(), json!("failed"));
    }

    #[test]
    fn test_finished_entry_carries_duration() {
        let timer = StepTimer::start(Step::ValidateTask);
        let entry = TraceEntry::finished(
            &timer,
            StepStatus::Failed,
            details(json!({"error": "bad"})),
        );
        assert_eq!(entry.step, Step::ValidateTask);
        assert!(entry.duration_ms.unwrap() >= 0.0);
        assert_eq!(entry.error(), Some("bad"));
    }

    #[test]
    fn test_details_of_non_object_is_empty() {
        assert!(details(json!([1, 2])).is_empty());
        assert_eq!(TraceEntry::started(Step::HandleError, Map::new()).duration_ms, Some(0.0));
    }
}
