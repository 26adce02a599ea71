//! Statistics execution: a closed set of tools over retrieved readings

pub mod registry;
pub mod tools;

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::types::Timestamp;
use crate::llm::task::{AggregationLevel, Operation, TaskSpecification};

pub use registry::{StatisticsEngine, ToolRegistry};

/// The analytics tools the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// One statistic over every row
    TemporalStatistic,
    /// One statistic per hourly, daily or weekly bucket
    TemporalAggregation,
    /// One statistic per location, ranked
    SpatialComparison,
    /// Descriptive statistics over every row
    StatisticalSummary,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::TemporalStatistic,
        ToolKind::TemporalAggregation,
        ToolKind::SpatialComparison,
        ToolKind::StatisticalSummary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::TemporalStatistic => "temporal_statistic",
            ToolKind::TemporalAggregation => "temporal_aggregation",
            ToolKind::SpatialComparison => "spatial_comparison",
            ToolKind::StatisticalSummary => "statistical_summary",
        }
    }

}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tool inputs taken from the task specification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolParams {
    pub operation: Operation,
    pub aggregation_level: Option<AggregationLevel>,
}

impl ToolParams {
    pub fn from_spec(spec: &TaskSpecification) -> Self {
        Self {
            operation: spec.operation(),
            aggregation_level: spec.aggregation_level(),
        }
    }
}

/// Value of one time bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodValue {
    pub period_start: Timestamp,
    pub value: f64,
}

/// Value of one location in a comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationValue {
    pub location: String,
    pub value: f64,
    pub rank: usize,
    /// `None` when the highest value is zero
    pub percent_of_highest: Option<f64>,
}

/// Descriptive statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    /// Sample deviation; `None` for a single value
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    /// `None` when the values have no spread
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
}

/// What a tool computed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultValue {
    Scalar(f64),
    Series(Vec<PeriodValue>),
    Ranking(Vec<LocationValue>),
    Summary(SummaryStats),
    None,
}

/// Render a number with at most two decimals, without trailing zeros
pub fn format_number(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Scalar(v) => f.write_str(&format_number(*v)),
            ResultValue::Series(periods) => {
                let parts: Vec<String> = periods
                    .iter()
                    .map(|p| {
                        format!(
                            "{}: {}",
                            p.period_start.format("%Y-%m-%d %H:%M"),
                            format_number(p.value)
                        )
                    })
                    .collect();
                f.write_str(&parts.join(", "))
            }
            ResultValue::Ranking(locations) => {
                let parts: Vec<String> = locations
                    .iter()
                    .map(|l| format!("#{} {}: {}", l.rank, l.location, format_number(l.value)))
                    .collect();
                f.write_str(&parts.join(", "))
            }
            ResultValue::Summary(s) => write!(
                f,
                "mean {} (min {}, median {}, max {}, n={})",
                format_number(s.mean),
                format_number(s.min),
                format_number(s.median),
                format_number(s.max),
                s.count
            ),
            ResultValue::None => f.write_str("n/a"),
        }
    }
}

/// Outcome of one tool execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsResult {
    pub value: ResultValue,
    pub unit: String,
    pub metadata: Map<String, Value>,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_time_ms: f64,
}

impl AnalyticsResult {
    pub fn success(value: ResultValue, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
            metadata: Map::new(),
            success: true,
            error_message: None,
            execution_time_ms: 0.0,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            value: ResultValue::None,
            unit: String::new(),
            metadata: Map::new(),
            success: false,
            error_message: Some(message.into()),
            execution_time_ms: 0.0,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
