//! Prompt templates for intent extraction and explanations

use chrono::Utc;

use crate::analytics::AnalyticsResult;
use crate::llm::context::SystemContext;
use crate::llm::task::TaskSpecification;

/// System prompt for turning a question into a task specification
pub const INTENT_SYSTEM_PROMPT: &str = r#"You convert questions about building sensor data into structured JSON task specifications for an analytics engine.

Return ONLY one JSON object with these fields (no markdown, no commentary):

{
  "intent_type": "query" | "comparison" | "aggregation",
  "sensor_type": one of the available sensor types,
  "location": a single location string, or a list of two or more locations for a comparison,
  "start_time": ISO 8601 datetime,
  "end_time": ISO 8601 datetime,
  "operation": "mean" | "max" | "min" | "sum" | "std" | "count",
  "aggregation_level": "hourly" | "daily" | "weekly" | null,
  "confidence": number between 0.0 and 1.0
}

INTENT TYPES:
- query: one statistic for one location
- comparison: the same statistic across several locations
- aggregation: a statistic bucketed hourly, daily or weekly for one location

Use only sensor types and locations listed in the context. aggregation_level must be null unless intent_type is "aggregation".
Resolve relative dates ("yesterday", "last week") against the current date given in the context."#;

/// System prompt for result and error explanations
pub const EXPLAIN_SYSTEM_PROMPT: &str = r#"You explain analytics results from a smart building system to non-technical users.
Answer in two or three plain sentences. Use only the numbers you are given."#;

/// User prompt for intent extraction
pub fn intent_prompt(query: &str, context: &SystemContext) -> String {
    format!(
        "CONTEXT:\n{}Current date: {}\n\nUSER QUERY:\n{}\n\nReturn the JSON task specification:",
        context.summary(),
        Utc::now().format("%Y-%m-%d"),
        query
    )
}

/// User prompt for explaining a successful computation
pub fn result_prompt(
    query: &str,
    spec: &TaskSpecification,
    result: &AnalyticsResult,
    warnings: &[String],
) -> String {
    let spec_json = serde_json::to_string_pretty(spec).unwrap_or_default();
    let result_json = serde_json::to_string_pretty(result).unwrap_or_default();

    let mut prompt = format!(
        "ORIGINAL QUESTION:\n{}\n\nTASK:\n{}\n\nRESULT:\n{}\n",
        query, spec_json, result_json
    );

    if !warnings.is_empty() {
        prompt.push_str("\nDATA NOTES:\n");
        for warning in warnings {
            prompt.push_str(&format!("- {}\n", warning));
        }
    }

    prompt.push_str(
        "\nAnswer the question directly. Include the value with its unit, mention the \
         sample size and time range, and mention any data notes. Do not invent information.",
    );
    prompt
}

/// User prompt for explaining why a query could not be answered
pub fn error_prompt(query: &str, errors: &[String]) -> String {
    let mut prompt = format!("USER QUERY:\n{}\n\nPROBLEMS:\n", query);
    for error in errors {
        prompt.push_str(&format!("- {}\n", error));
    }
    prompt.push_str(
        "\nExplain politely what went wrong and how the user could rephrase the question. \
         Avoid technical jargon. Two or three sentences at most.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::core::types::TimeRange;

    #[test]
    fn test_intent_prompt_includes_context() {
        let context = SystemContext {
            available_sensors: vec!["humidity".into(), "temperature".into()],
            available_locations: vec!["Node 15".into()],
            time_range: TimeRange::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            ),
        };
        let prompt = intent_prompt("How warm was Node 15?", &context);
        assert!(prompt.contains("humidity, temperature"));
        assert!(prompt.contains("Node 15"));
        assert!(prompt.contains("2024-01-01 to 2024-03-01"));
        assert!(prompt.ends_with("Return the JSON task specification:"));
    }

    #[test]
    fn test_error_prompt_lists_every_problem() {
        let errors = vec!["Unknown sensor type 'light'".to_string(), "bad dates".to_string()];
        let prompt = error_prompt("light levels?", &errors);
        assert!(prompt.contains("- Unknown sensor type 'light'\n"));
        assert!(prompt.contains("- bad dates\n"));
    }
}
