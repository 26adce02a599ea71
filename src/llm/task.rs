//! Structured analytic intent extracted from a user query
//!
//! A `TaskSpecification` can only be obtained through `TaskSpecification::new`,
//! which enforces every construction rule. Once built it is never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::types::Timestamp;

/// Kind of question the user asked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntentKind {
    /// One statistic for one location
    #[serde(rename = "query")]
    SingleQuery,
    /// The same statistic across two or more locations
    #[serde(rename = "comparison")]
    Comparison,
    /// A statistic bucketed over time for one location
    #[serde(rename = "aggregation")]
    Aggregation,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::SingleQuery => "query",
            IntentKind::Comparison => "comparison",
            IntentKind::Aggregation => "aggregation",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        match s {
            "query" => Some(IntentKind::SingleQuery),
            "comparison" => Some(IntentKind::Comparison),
            "aggregation" => Some(IntentKind::Aggregation),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical operation requested by the user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Mean,
    Max,
    Min,
    Sum,
    Std,
    Count,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Mean,
        Operation::Max,
        Operation::Min,
        Operation::Sum,
        Operation::Std,
        Operation::Count,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Mean => "mean",
            Operation::Max => "max",
            Operation::Min => "min",
            Operation::Sum => "sum",
            Operation::Std => "std",
            Operation::Count => "count",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporal bucketing granularity for aggregation requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    Hourly,
    Daily,
    Weekly,
}

impl AggregationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationLevel::Hourly => "hourly",
            AggregationLevel::Daily => "daily",
            AggregationLevel::Weekly => "weekly",
        }
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(AggregationLevel::Hourly),
            "daily" => Some(AggregationLevel::Daily),
            "weekly" => Some(AggregationLevel::Weekly),
            _ => None,
        }
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A violated construction rule
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value {value:?} for field '{field}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("{intent} queries require {expected}, got {actual} location(s)")]
    LocationArity {
        intent: IntentKind,
        expected: &'static str,
        actual: usize,
    },

    #[error("location names must not be empty")]
    EmptyLocation,

    #[error("end_time ({end}) must be after start_time ({start})")]
    TimeOrder { start: Timestamp, end: Timestamp },

    #[error("confidence {0} is outside 0.0..=1.0")]
    ConfidenceOutOfRange(f64),

    #[error("aggregation queries require an aggregation level")]
    MissingAggregationLevel,

    #[error("aggregation level '{level}' is only allowed for aggregation queries, not {intent}")]
    UnexpectedAggregationLevel {
        intent: IntentKind,
        level: AggregationLevel,
    },
}

/// The structured, validated representation of a user's analytic intent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSpecification {
    intent: IntentKind,
    sensor_type: String,
    locations: Vec<String>,
    start_time: Timestamp,
    end_time: Timestamp,
    operation: Operation,
    aggregation_level: Option<AggregationLevel>,
    confidence: f64,
}

impl TaskSpecification {
    /// Build a specification, enforcing every construction rule
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intent: IntentKind,
        sensor_type: impl Into<String>,
        locations: Vec<String>,
        start_time: Timestamp,
        end_time: Timestamp,
        operation: Operation,
        aggregation_level: Option<AggregationLevel>,
        confidence: f64,
    ) -> Result<Self, SpecError> {
        let sensor_type = sensor_type.into();
        if sensor_type.trim().is_empty() {
            return Err(SpecError::MissingField("sensor_type"));
        }

        if locations.iter().any(|l| l.trim().is_empty()) {
            return Err(SpecError::EmptyLocation);
        }

        match intent {
            IntentKind::SingleQuery | IntentKind::Aggregation if locations.len() != 1 => {
                return Err(SpecError::LocationArity {
                    intent,
                    expected: "exactly one",
                    actual: locations.len(),
                });
            }
            IntentKind::Comparison if locations.len() < 2 => {
                return Err(SpecError::LocationArity {
                    intent,
                    expected: "two or more",
                    actual: locations.len(),
                });
            }
            _ => {}
        }

        if end_time <= start_time {
            return Err(SpecError::TimeOrder {
                start: start_time,
                end: end_time,
            });
        }

        if !(0.0..=1.0).contains(&confidence) {
            return Err(SpecError::ConfidenceOutOfRange(confidence));
        }

        match (intent, aggregation_level) {
            (IntentKind::Aggregation, None) => return Err(SpecError::MissingAggregationLevel),
            (IntentKind::SingleQuery | IntentKind::Comparison, Some(level)) => {
                return Err(SpecError::UnexpectedAggregationLevel { intent, level });
            }
            _ => {}
        }

        Ok(Self {
            intent,
            sensor_type,
            locations,
            start_time,
            end_time,
            operation,
            aggregation_level,
            confidence,
        })
    }

    pub fn intent(&self) -> IntentKind {
        self.intent
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn aggregation_level(&self) -> Option<AggregationLevel> {
        self.aggregation_level
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn build(
        intent: IntentKind,
        locations: &[&str],
        level: Option<AggregationLevel>,
    ) -> Result<TaskSpecification, SpecError> {
        TaskSpecification::new(
            intent,
            "temperature",
            locations.iter().map(|s| s.to_string()).collect(),
            day(1),
            day(2),
            Operation::Mean,
            level,
            0.9,
        )
    }

    #[test]
    fn test_single_query_with_one_location() {
        let spec = build(IntentKind::SingleQuery, &["Node 15"], None).unwrap();
        assert_eq!(spec.locations(), ["Node 15".to_string()]);
        assert_eq!(spec.intent(), IntentKind::SingleQuery);
    }

    #[test]
    fn test_comparison_requires_two_locations() {
        let err = build(IntentKind::Comparison, &["Node 15"], None).unwrap_err();
        assert!(matches!(err, SpecError::LocationArity { actual: 1, .. }));

        let spec = build(IntentKind::Comparison, &["Node 15", "Node 16"], None).unwrap();
        assert_eq!(spec.locations().len(), 2);
    }

    #[test]
    fn test_single_query_rejects_multiple_locations() {
        let err = build(IntentKind::SingleQuery, &["Node 15", "Node 16"], None).unwrap_err();
        assert!(matches!(
            err,
            SpecError::LocationArity {
                intent: IntentKind::SingleQuery,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_time_order_enforced() {
        let err = TaskSpecification::new(
            IntentKind::SingleQuery,
            "temperature",
            vec!["Node 15".into()],
            day(2),
            day(2),
            Operation::Max,
            None,
            0.9,
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::TimeOrder { .. }));
    }

    #[test]
    fn test_confidence_bounds() {
        let err = TaskSpecification::new(
            IntentKind::SingleQuery,
            "temperature",
            vec!["Node 15".into()],
            day(1),
            day(2),
            Operation::Max,
            None,
            1.2,
        )
        .unwrap_err();
        assert_eq!(err, SpecError::ConfidenceOutOfRange(1.2));
    }

    #[test]
    fn test_aggregation_level_rules() {
        assert_eq!(
            build(IntentKind::Aggregation, &["Node 15"], None).unwrap_err(),
            SpecError::MissingAggregationLevel
        );
        assert!(matches!(
            build(IntentKind::SingleQuery, &["Node 15"], Some(AggregationLevel::Daily)),
            Err(SpecError::UnexpectedAggregationLevel { .. })
        ));
        let spec = build(IntentKind::Aggregation, &["Node 15"], Some(AggregationLevel::Hourly)).unwrap();
        assert_eq!(spec.aggregation_level(), Some(AggregationLevel::Hourly));
    }

    #[test]
    fn test_blank_location_rejected() {
        assert_eq!(
            build(IntentKind::SingleQuery, &["  "], None).unwrap_err(),
            SpecError::EmptyLocation
        );
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(Operation::from_canonical("std"), Some(Operation::Std));
        assert_eq!(Operation::from_canonical("average"), None);
        assert_eq!(IntentKind::from_canonical("query"), Some(IntentKind::SingleQuery));
        assert_eq!(AggregationLevel::Weekly.to_string(), "weekly");
    }
}
