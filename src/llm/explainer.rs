//! Natural-language explanations of results and failures

use std::sync::Arc;

use async_trait::async_trait;

use crate::analytics::AnalyticsResult;
use crate::core::error::{AgentError, Result};
use crate::llm::client::LanguageModel;
use crate::llm::prompts;
use crate::llm::task::TaskSpecification;

/// Sentence used when nothing more specific can be said about a failure
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred processing your query.";

/// Turns computed results and error lists into prose for the user
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain_results(
        &self,
        query: &str,
        spec: &TaskSpecification,
        result: &AnalyticsResult,
        warnings: &[String],
    ) -> Result<String>;

    async fn explain_error(&self, query: &str, errors: &[String]) -> Result<String>;
}

/// Explainer backed by a language model
pub struct LlmExplainer {
    model: Arc<dyn LanguageModel>,
}

impl LlmExplainer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    async fn ask(&self, user: String) -> Result<String> {
        let text = self
            .model
            .complete(prompts::EXPLAIN_SYSTEM_PROMPT, &user)
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::LlmError("Model returned an empty explanation".into()));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Explainer for LlmExplainer {
    async fn explain_results(
        &self,
        query: &str,
        spec: &TaskSpecification,
        result: &AnalyticsResult,
        warnings: &[String],
    ) -> Result<String> {
        self.ask(prompts::result_prompt(query, spec, result, warnings))
            .await
    }

    async fn explain_error(&self, query: &str, errors: &[String]) -> Result<String> {
        self.ask(prompts::error_prompt(query, errors)).await
    }
}

/// Templated explanation used when the explainer cannot produce one
pub fn fallback_result_explanation(result: &AnalyticsResult, warnings: &[String]) -> String {
    let mut text = format!("Result: {} {}", result.value, result.unit)
        .trim_end()
        .to_string();
    for warning in warnings {
        text.push_str(&format!("\nNote: {}", warning));
    }
    text
}

/// Bullet list of raw errors, or a fixed sentence when there is nothing to list
pub fn fallback_error_explanation(errors: &[String]) -> String {
    if errors.is_empty() {
        return GENERIC_ERROR_MESSAGE.to_string();
    }

    let mut text = String::from("I encountered some issues with your query:\n");
    for error in errors {
        text.push_str(&format!("• {}\n", error));
    }
    text.trim_end().to_string()
}
