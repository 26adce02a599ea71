//! The workflow state machine
//!
//! Interpret -> Validate -> Retrieve -> Compute -> Explain, with an escape to
//! HandleError from the first four. Each step records one `started` and one
//! `completed`/`failed` trace entry. The next step is chosen from the state
//! alone; no step runs twice and nothing is retried here.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map};
use tracing::{error, info, warn};

use crate::agent::state::WorkflowState;
use crate::agent::trace::{details, Step, StepStatus};
use crate::analytics::{StatisticsEngine, ToolParams, ToolRegistry};
use crate::catalog::{SensorCatalog, SensorSource};
use crate::core::config::AgentConfig;
use crate::core::error::{AgentError, Result};
use crate::data::{CatalogRetriever, DataQuery, DataRetriever};
use crate::llm::client::{LanguageModel, LlmClient};
use crate::llm::explainer::{
    fallback_error_explanation, fallback_result_explanation, Explainer, LlmExplainer,
};
use crate::llm::parser::{ParseError, TaskSpecParser};
use crate::llm::prompts;
use crate::llm::task::TaskSpecification;
use crate::validation::ContextValidator;

/// Where the run goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Interpret,
    Validate,
    Retrieve,
    Compute,
    Explain,
    HandleError,
    End,
}

/// Drives one query at a time through the pipeline
///
/// The engine holds no per-query state; independent queries may run
/// concurrently on the same engine.
pub struct WorkflowEngine {
    model: Arc<dyn LanguageModel>,
    explainer: Arc<dyn Explainer>,
    catalog: Arc<SensorCatalog>,
    retriever: Arc<dyn DataRetriever>,
    statistics: Arc<dyn StatisticsEngine>,
    min_confidence: f64,
}

impl WorkflowEngine {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        explainer: Arc<dyn Explainer>,
        catalog: Arc<SensorCatalog>,
        retriever: Arc<dyn DataRetriever>,
        statistics: Arc<dyn StatisticsEngine>,
    ) -> Self {
        Self {
            model,
            explainer,
            catalog,
            retriever,
            statistics,
            min_confidence: 0.0,
        }
    }

    /// Reject interpretations below `threshold` confidence
    pub fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Wire the shipped collaborators from configuration
    pub fn from_config(config: &AgentConfig, source: Arc<dyn SensorSource>) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = Arc::new(LlmClient::from_config(&config.llm)?);
        let explainer = Arc::new(LlmExplainer::new(model.clone()));
        let catalog = Arc::new(SensorCatalog::new(source, &config.catalog));
        let retriever = Arc::new(CatalogRetriever::new(catalog.clone()));
        let statistics = Arc::new(ToolRegistry::with_default_tools());

        Ok(Self::new(model, explainer, catalog, retriever, statistics)
            .with_min_confidence(config.llm.min_confidence))
    }

    pub fn catalog(&self) -> &Arc<SensorCatalog> {
        &self.catalog
    }

    /// Run one query to completion. Never fails: every problem ends up in
    /// the returned state's `error_explanation`.
    pub async fn execute(&self, query: &str) -> WorkflowState {
        let mut state = WorkflowState::new(query);
        info!(run_id = %state.run_id, query, "Workflow started");

        let mut stage = Stage::Interpret;
        while stage != Stage::End {
            stage = match stage {
                Stage::Interpret => {
                    self.interpret(&mut state).await;
                    after_interpret(&state)
                }
                Stage::Validate => {
                    self.validate(&mut state).await;
                    after_validate(&state)
                }
                Stage::Retrieve => {
                    self.retrieve(&mut state).await;
                    after_retrieve(&state)
                }
                Stage::Compute => {
                    self.compute(&mut state);
                    after_compute(&state)
                }
                Stage::Explain => {
                    self.explain(&mut state).await;
                    Stage::End
                }
                Stage::HandleError => {
                    self.handle_error(&mut state).await;
                    Stage::End
                }
                Stage::End => Stage::End,
            };
        }

        state.finished_at = Some(Utc::now());
        info!(
            run_id = %state.run_id,
            success = state.success,
            steps = state.trace.len(),
            "Workflow finished"
        );
        state
    }

    async fn extract_task(&self, query: &str) -> Result<TaskSpecification> {
        let context = self.catalog.system_context().await?;
        let raw = self
            .model
            .complete(
                prompts::INTENT_SYSTEM_PROMPT,
                &prompts::intent_prompt(query, &context),
            )
            .await?;

        let spec = TaskSpecParser::new(Utc::now()).parse(&raw)?;
        if spec.confidence() < self.min_confidence {
            return Err(ParseError::LowConfidence {
                confidence: spec.confidence(),
                threshold: self.min_confidence,
            }
            .into());
        }
        Ok(spec)
    }

    async fn interpret(&self, state: &mut WorkflowState) {
        let entry = details(json!({ "user_query": state.query }));
        let timer = state.begin(Step::InterpretQuery, entry);

        match self.extract_task(&state.query).await {
            Ok(spec) => {
                let summary = details(json!({
                    "intent_type": spec.intent(),
                    "sensor_type": spec.sensor_type(),
                    "locations": spec.locations(),
                    "operation": spec.operation(),
                    "aggregation_level": spec.aggregation_level(),
                    "confidence": spec.confidence(),
                }));
                state.finish(timer, StepStatus::Completed, summary);
                state.task_spec = Some(spec);
            }
            Err(e) => {
                warn!(error = %e, "Query interpretation failed");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({ "error": e.to_string() })),
                );
                state.validation_errors = vec![format!("Failed to understand query: {}", e)];
            }
        }
    }

    async fn validate(&self, state: &mut WorkflowState) {
        let entry = details(json!({ "task_spec": state.task_spec }));
        let timer = state.begin(Step::ValidateTask, entry);

        let Some(spec) = state.task_spec.clone() else {
            state.validation_errors = vec!["No task specification to validate".to_string()];
            state.finish(
                timer,
                StepStatus::Failed,
                details(json!({ "error": "Missing task specification" })),
            );
            return;
        };

        match ContextValidator::validate_with_catalog(&spec, &self.catalog).await {
            Ok(errors) if errors.is_empty() => {
                state.finish(
                    timer,
                    StepStatus::Completed,
                    details(json!({ "message": "Task specification is valid" })),
                );
            }
            Ok(errors) => {
                info!(num_errors = errors.len(), "Task failed validation");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({
                        "error": errors.join("; "),
                        "errors": errors,
                        "num_errors": errors.len(),
                    })),
                );
                state.validation_errors = errors;
            }
            Err(e) => {
                warn!(error = %e, "Validation could not run");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({ "error": e.to_string() })),
                );
                state.validation_errors = vec![format!("Validation error: {}", e)];
            }
        }
    }

    async fn retrieve(&self, state: &mut WorkflowState) {
        let entry = details(json!({ "task_spec": state.task_spec }));
        let timer = state.begin(Step::RetrieveData, entry);

        let Some(spec) = state.task_spec.clone() else {
            state.validation_errors = vec!["No task specification available".to_string()];
            state.finish(
                timer,
                StepStatus::Failed,
                details(json!({ "error": "Missing task specification" })),
            );
            return;
        };

        match self.retriever.retrieve(&DataQuery::from_spec(&spec)).await {
            Ok(dataset) if dataset.is_empty() => {
                let message = format!(
                    "No data found for {} in {}",
                    spec.sensor_type(),
                    spec.locations().join(", ")
                );
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({
                        "error": message,
                        "rows_retrieved": 0,
                        "skipped_locations": dataset.skipped,
                    })),
                );
                let mut errors = vec![message];
                errors.extend(dataset.skipped.iter().map(|s| s.describe()));
                state.validation_errors = errors;
            }
            Ok(dataset) => {
                for skipped in &dataset.skipped {
                    warn!(location = %skipped.location, reason = %skipped.reason, "Location dropped from results");
                    state.warnings.push(skipped.describe());
                }
                let time_range = dataset
                    .time_span()
                    .map(|(first, last)| format!("{} to {}", first.to_rfc3339(), last.to_rfc3339()));
                state.finish(
                    timer,
                    StepStatus::Completed,
                    details(json!({
                        "rows_retrieved": dataset.len(),
                        "locations": dataset.locations(),
                        "time_range": time_range,
                        "skipped_locations": dataset.skipped,
                        "has_quality_issues": dataset.has_quality_issues(),
                    })),
                );
                state.dataset = Some(dataset);
            }
            Err(e) => {
                warn!(error = %e, "Data retrieval failed");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({ "error": e.to_string() })),
                );
                state.validation_errors = vec![format!("Data retrieval failed: {}", e)];
            }
        }
    }

    fn compute(&self, state: &mut WorkflowState) {
        let entry = details(json!({
            "operation": state.task_spec.as_ref().map(|s| s.operation()),
        }));
        let timer = state.begin(Step::ExecuteAnalytics, entry);

        let outcome = match (&state.task_spec, &state.dataset) {
            (Some(spec), Some(data)) => match self.statistics.tool_for(spec) {
                Some(tool) => {
                    let result = self.statistics.execute(tool, data, &ToolParams::from_spec(spec));
                    Ok((tool, spec.operation(), result))
                }
                None => Err(format!(
                    "No analytics tool registered for operation '{}'",
                    spec.operation()
                )),
            },
            _ => Err("No data available for analytics".to_string()),
        };

        match outcome {
            Ok((tool, operation, result)) if result.success => {
                state.finish(
                    timer,
                    StepStatus::Completed,
                    details(json!({
                        "tool": tool.name(),
                        "operation": operation,
                        "result_value": result.value,
                        "result_unit": result.unit,
                        "tool_execution_time_ms": result.execution_time_ms,
                    })),
                );
                state.result = Some(result);
            }
            Ok((tool, _, result)) => {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "Analytics execution failed".to_string());
                warn!(tool = tool.name(), error = %message, "Analytics tool reported failure");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({ "error": message, "tool": tool.name() })),
                );
                state.validation_errors = vec![message];
            }
            Err(message) => {
                warn!(error = %message, "Analytics could not run");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({ "error": message })),
                );
                state.validation_errors = vec![message];
            }
        }
    }

    /// Explanation failures are absorbed: the run stays successful with a
    /// templated explanation.
    async fn explain(&self, state: &mut WorkflowState) {
        let timer = state.begin(Step::GenerateExplanation, Map::new());

        let outcome = match (&state.task_spec, &state.result) {
            (Some(spec), Some(result)) => {
                let explainer = self.explainer.clone();
                let query = state.query.clone();
                let spec = spec.clone();
                let result = result.clone();
                let warnings = state.warnings.clone();
                tokio::spawn(async move {
                    explainer
                        .explain_results(&query, &spec, &result, &warnings)
                        .await
                })
                .await
                .unwrap_or_else(|join_error| {
                    Err(AgentError::LlmError(format!("Explainer aborted: {}", join_error)))
                })
                .and_then(|text| {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        Err(AgentError::LlmError("Empty explanation".into()))
                    } else {
                        Ok(text)
                    }
                })
            }
            _ => Err(AgentError::LlmError("No analytics result to explain".into())),
        };

        match outcome {
            Ok(text) => {
                state.finish(
                    timer,
                    StepStatus::Completed,
                    details(json!({ "explanation_length": text.len() })),
                );
                state.explanation = Some(text);
                state.success = true;
            }
            Err(e) => {
                warn!(error = %e, "Explanation failed, using templated result");
                state.finish(
                    timer,
                    StepStatus::Failed,
                    details(json!({ "error": e.to_string(), "fallback": true })),
                );
                match &state.result {
                    Some(result) => {
                        state.explanation =
                            Some(fallback_result_explanation(result, &state.warnings));
                        state.success = true;
                    }
                    None => {
                        state.error_explanation = Some(fallback_error_explanation(&[]));
                        state.success = false;
                    }
                }
            }
        }
    }

    /// Terminal error path. Runs the explainer on its own task so that not
    /// even a panic in it escapes; falls back to a bullet list of errors.
    async fn handle_error(&self, state: &mut WorkflowState) {
        let entry = details(json!({ "num_errors": state.validation_errors.len() }));
        let timer = state.begin(Step::HandleError, entry);

        let errors = state.validation_errors.clone();
        let explainer = self.explainer.clone();
        let query = state.query.clone();
        let task_errors = errors.clone();
        let attempt =
            tokio::spawn(async move { explainer.explain_error(&query, &task_errors).await }).await;

        let (text, source) = match attempt {
            Ok(Ok(text)) if !text.trim().is_empty() => (text.trim().to_string(), "explainer"),
            Ok(Ok(_)) => {
                warn!("Error explanation was blank, using templated list");
                (fallback_error_explanation(&errors), "template")
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error explanation failed, using templated list");
                (fallback_error_explanation(&errors), "template")
            }
            Err(join_error) => {
                error!(error = %join_error, "Error explainer aborted, using templated list");
                (fallback_error_explanation(&errors), "template")
            }
        };

        state.error_explanation = Some(text);
        state.success = false;
        state.finish(
            timer,
            StepStatus::Completed,
            details(json!({ "source": source, "num_errors": errors.len() })),
        );
    }
}

fn after_interpret(state: &WorkflowState) -> Stage {
    if state.task_spec.is_some() && state.validation_errors.is_empty() {
        Stage::Validate
    } else {
        Stage::HandleError
    }
}

fn after_validate(state: &WorkflowState) -> Stage {
    if state.task_spec.is_some() && state.validation_errors.is_empty() {
        Stage::Retrieve
    } else {
        Stage::HandleError
    }
}

fn after_retrieve(state: &WorkflowState) -> Stage {
    match &state.dataset {
        Some(data) if !data.is_empty() && state.validation_errors.is_empty() => Stage::Compute,
        _ => Stage::HandleError,
    }
}

fn after_compute(state: &WorkflowState) -> Stage {
    match &state.result {
        Some(result) if result.success && state.validation_errors.is_empty() => Stage::Explain,
        _ => Stage::HandleError,
    }
}
