//! Parse raw model output into a validated `TaskSpecification`
//!
//! The model is asked for JSON but routinely wraps it in markdown fences,
//! adds prose around it, or uses near-miss vocabulary ("avg", "hour").
//! Parsing therefore runs in stages: extract the payload, decode it, rewrite
//! known synonyms, parse timestamps, coerce confidence, then construct the
//! typed specification. The parser is a pure function of its input and its
//! reference time.

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::types::Timestamp;
use crate::llm::dates::{self, Bound};
use crate::llm::normalize;
use crate::llm::task::{AggregationLevel, IntentKind, Operation, SpecError, TaskSpecification};

/// Confidence used when the model reports one that cannot be read as a number
pub const UNREADABLE_CONFIDENCE: f64 = 0.8;

/// Confidence used when the model omits the field entirely
pub const MISSING_CONFIDENCE: f64 = 0.85;

/// Why model output could not become a task specification
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("No JSON object found in model output")]
    NoStructuredPayload,

    #[error("Invalid JSON in model output: {message}")]
    MalformedPayload { message: String, text: String },

    #[error("Cannot parse {field} {raw:?} as a timestamp")]
    UnparsableTimestamp { field: &'static str, raw: String },

    #[error("Invalid task specification: {0}")]
    SpecConstruction(#[from] SpecError),

    #[error(
        "Low confidence extraction ({confidence:.2}, threshold {threshold:.2}). \
         Please rephrase your query to be more specific."
    )]
    LowConfidence { confidence: f64, threshold: f64 },
}

/// Converts raw model text into task specifications
#[derive(Debug, Clone, Copy)]
pub struct TaskSpecParser {
    /// Instant that relative dates ("yesterday") are resolved against
    reference: Timestamp,
}

impl Default for TaskSpecParser {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TaskSpecParser {
    pub fn new(reference: Timestamp) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> Timestamp {
        self.reference
    }

    /// Parse model output into a task specification
    pub fn parse(&self, raw: &str) -> Result<TaskSpecification, ParseError> {
        let payload = extract_payload(raw)?;

        let decoded: Value =
            serde_json::from_str(payload).map_err(|e| ParseError::MalformedPayload {
                message: e.to_string(),
                text: payload.to_string(),
            })?;

        let Value::Object(fields) = decoded else {
            return Err(ParseError::MalformedPayload {
                message: "expected a JSON object".into(),
                text: payload.to_string(),
            });
        };

        self.build(&fields)
    }

    fn build(&self, fields: &Map<String, Value>) -> Result<TaskSpecification, ParseError> {
        let intent_raw = required_str(fields, &["intent_type", "intent"], "intent_type")?;
        let intent_name = normalize::intent(intent_raw);
        let intent = IntentKind::from_canonical(&intent_name).ok_or(SpecError::InvalidValue {
            field: "intent_type",
            value: intent_name,
        })?;

        let sensor_type =
            normalize::sensor_type(required_str(fields, &["sensor_type"], "sensor_type")?);

        let locations = locations(fields)?;

        let start_time = self.timestamp(fields, "start_time", Bound::Start)?;
        let end_time = self.timestamp(fields, "end_time", Bound::End)?;

        let op_name = normalize::operation(required_str(fields, &["operation"], "operation")?);
        let operation = Operation::from_canonical(&op_name).ok_or(SpecError::InvalidValue {
            field: "operation",
            value: op_name,
        })?;

        let aggregation_level = aggregation_level(fields)?;
        let confidence = confidence(fields);

        Ok(TaskSpecification::new(
            intent,
            sensor_type,
            locations,
            start_time,
            end_time,
            operation,
            aggregation_level,
            confidence,
        )?)
    }

    fn timestamp(
        &self,
        fields: &Map<String, Value>,
        field: &'static str,
        bound: Bound,
    ) -> Result<Timestamp, ParseError> {
        match fields.get(field) {
            None | Some(Value::Null) => Err(SpecError::MissingField(field).into()),
            Some(Value::String(raw)) => dates::parse_timestamp(raw, bound, self.reference)
                .ok_or_else(|| ParseError::UnparsableTimestamp {
                    field,
                    raw: raw.clone(),
                }),
            Some(other) => Err(SpecError::InvalidValue {
                field,
                value: other.to_string(),
            }
            .into()),
        }
    }
}

/// Extract the JSON object candidate from model output (handles fences and prose)
pub fn extract_payload(response: &str) -> Result<&str, ParseError> {
    let mut text = response.trim();

    if text.starts_with("```") {
        if let (Some(first_newline), Some(closing)) = (text.find('\n'), text.rfind("```")) {
            if closing > first_newline {
                text = text[first_newline + 1..closing].trim();
            }
        }
    }

    let start = text.find('{').ok_or(ParseError::NoStructuredPayload)?;
    let end = text.rfind('}').ok_or(ParseError::NoStructuredPayload)?;
    if end < start {
        return Err(ParseError::NoStructuredPayload);
    }
    Ok(&text[start..=end])
}

fn required_str<'a>(
    fields: &'a Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<&'a str, ParseError> {
    let value = keys
        .iter()
        .find_map(|k| fields.get(*k).filter(|v| !v.is_null()))
        .ok_or(SpecError::MissingField(field))?;

    value.as_str().ok_or_else(|| {
        SpecError::InvalidValue {
            field,
            value: value.to_string(),
        }
        .into()
    })
}

fn locations(fields: &Map<String, Value>) -> Result<Vec<String>, ParseError> {
    let value = ["location", "locations"]
        .iter()
        .find_map(|k| fields.get(*k).filter(|v| !v.is_null()))
        .ok_or(SpecError::MissingField("location"))?;

    let invalid = || SpecError::InvalidValue {
        field: "location",
        value: value.to_string(),
    };

    match value {
        Value::String(s) => Ok(vec![s.trim().to_string()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(invalid)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(ParseError::from),
        _ => Err(invalid().into()),
    }
}

fn aggregation_level(fields: &Map<String, Value>) -> Result<Option<AggregationLevel>, ParseError> {
    match fields.get("aggregation_level") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => match normalize::aggregation_level(raw) {
            None => Ok(None),
            Some(name) => AggregationLevel::from_canonical(&name)
                .map(Some)
                .ok_or_else(|| {
                    SpecError::InvalidValue {
                        field: "aggregation_level",
                        value: name,
                    }
                    .into()
                }),
        },
        Some(other) => Err(SpecError::InvalidValue {
            field: "aggregation_level",
            value: other.to_string(),
        }
        .into()),
    }
}

fn confidence(fields: &Map<String, Value>) -> f64 {
    match fields.get("confidence") {
        None => MISSING_CONFIDENCE,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(UNREADABLE_CONFIDENCE),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(UNREADABLE_CONFIDENCE),
        Some(_) => UNREADABLE_CONFIDENCE,
    }
}
