//! Per-query workflow state

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::agent::trace::{Step, StepStatus, StepTimer, TraceEntry};
use crate::analytics::AnalyticsResult;
use crate::core::types::{RunId, Timestamp};
use crate::data::Dataset;
use crate::llm::task::TaskSpecification;

/// Everything one query accumulates on its way through the pipeline
///
/// Owned by exactly one run. Optional fields are filled by the step that
/// produces them and checked by every step that reads them.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub run_id: RunId,
    pub query: String,
    pub task_spec: Option<TaskSpecification>,
    /// Errors carried to the error handler, from any step
    pub validation_errors: Vec<String>,
    #[serde(skip)]
    pub dataset: Option<Dataset>,
    pub result: Option<AnalyticsResult>,
    pub explanation: Option<String>,
    pub error_explanation: Option<String>,
    /// Non-fatal notes, e.g. locations dropped from a comparison
    pub warnings: Vec<String>,
    pub trace: Vec<TraceEntry>,
    pub success: bool,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

/// Aggregate view of a trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total_steps: usize,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub total_duration_ms: f64,
    pub success: bool,
}

impl WorkflowState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            query: query.into(),
            task_spec: None,
            validation_errors: Vec::new(),
            dataset: None,
            result: None,
            explanation: None,
            error_explanation: None,
            warnings: Vec::new(),
            trace: Vec::new(),
            success: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record entry into `step` and start timing it
    pub fn begin(&mut self, step: Step, details: Map<String, Value>) -> StepTimer {
        self.trace.push(TraceEntry::started(step, details));
        StepTimer::start(step)
    }

    /// Record exit from the step `timer` measures
    pub fn finish(&mut self, timer: StepTimer, status: StepStatus, details: Map<String, Value>) {
        self.trace.push(TraceEntry::finished(&timer, status, details));
    }

    /// Exit entries only, in order: one `(step, status)` per executed step
    pub fn outcomes(&self) -> Vec<(Step, StepStatus)> {
        self.trace
            .iter()
            .filter(|e| e.status != StepStatus::Started)
            .map(|e| (e.step, e.status))
            .collect()
    }

    pub fn summary(&self) -> ExecutionSummary {
        let count = |status: StepStatus| self.trace.iter().filter(|e| e.status == status).count();
        ExecutionSummary {
            total_steps: self.trace.len(),
            steps_completed: count(StepStatus::Completed),
            steps_failed: count(StepStatus::Failed),
            total_duration_ms: self.trace.iter().filter_map(|e| e.duration_ms).sum(),
            success: self.success,
        }
    }

    /// Numbered text rendering of the trace, with a summary footer
    pub fn render_trace(&self) -> String {
        if self.trace.is_empty() {
            return "No execution trace available".to_string();
        }

        let rule = "=".repeat(60);
        let mut lines = vec!["Execution Trace:".to_string(), rule.clone()];

        for (i, entry) in self.trace.iter().enumerate() {
            let duration = entry
                .duration_ms
                .map(|d| format!("{:.2}ms", d))
                .unwrap_or_else(|| "N/A".to_string());
            lines.push(format!(
                "{}. {} {} ({}) - {}",
                i + 1,
                entry.status.symbol(),
                entry.step,
                entry.status.as_str(),
                duration
            ));
            if entry.status == StepStatus::Failed {
                if let Some(error) = entry.error() {
                    lines.push(format!("   Error: {}", error));
                }
            }
        }

        let summary = self.summary();
        lines.push(rule);
        lines.push(format!("Total Duration: {:.2}ms", summary.total_duration_ms));
        lines.push(format!("Steps Completed: {}", summary.steps_completed));
        lines.push(format!("Steps Failed: {}", summary.steps_failed));
        lines.push(format!("Success: {}", summary.success));

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::trace::details;
    use serde_json::json;

    #[test]
    fn test_new_state_is_empty() {
        let state = WorkflowState::new("How warm was it?");
        assert_eq!(state.query, "How warm was it?");
        assert!(!state.success);
        assert!(state.trace.is_empty());
        assert_eq!(state.render_trace(), "No execution trace available");
    }

    #[test]
    fn test_summary_counts_statuses() {
        let mut state = WorkflowState::new("q");
        let timer = state.begin(Step::InterpretQuery, Map::new());
        state.finish(timer, StepStatus::Completed, Map::new());
        let timer = state.begin(Step::ValidateTask, Map::new());
        state.finish(timer, StepStatus::Failed, details(json!({"error": "Unknown location"})));

        let summary = state.summary();
        assert_eq!(summary.total_steps, 4);
        assert_eq!(summary.steps_completed, 1);
        assert_eq!(summary.steps_failed, 1);
        assert!(!summary.success);

        assert_eq!(
            state.outcomes(),
            vec![
                (Step::InterpretQuery, StepStatus::Completed),
                (Step::ValidateTask, StepStatus::Failed)
            ]
        );
    }

    #[test]
    fn test_render_trace_shows_errors() {
        let mut state = WorkflowState::new("q");
        let timer = state.begin(Step::RetrieveData, Map::new());
        state.finish(timer, StepStatus::Failed, details(json!({"error": "No data"})));

        let rendered = state.render_trace();
        assert!(rendered.starts_with("Execution Trace:\n"));
        assert!(rendered.contains("1. → retrieve_data (started) - 0.00ms"));
        assert!(rendered.contains("2. ✗ retrieve_data (failed)"));
        assert!(rendered.contains("   Error: No data"));
        assert!(rendered.ends_with("Success: false"));
    }
}
