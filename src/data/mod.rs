//! Tabular sensor readings handed from retrieval to analytics

pub mod retriever;

use serde::Serialize;

use crate::core::types::Timestamp;
use crate::llm::task::TaskSpecification;

pub use retriever::{CatalogRetriever, DataRetriever};

/// One row of retrieved data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp: Timestamp,
    pub value: f64,
    pub unit: String,
    /// Location as requested by the user, not as stored upstream
    pub location: String,
    pub quality_flag: Option<String>,
}

/// A location that was requested but could not be retrieved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLocation {
    pub location: String,
    pub reason: String,
}

impl SkippedLocation {
    /// One-line note suitable for warnings and explanations
    pub fn describe(&self) -> String {
        format!("Data for {} was unavailable: {}", self.location, self.reason)
    }
}

/// Result of a retrieval: rows from every location that succeeded
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub rows: Vec<Reading>,
    pub skipped: Vec<SkippedLocation>,
}

impl Dataset {
    pub fn new(rows: Vec<Reading>) -> Self {
        Self {
            rows,
            skipped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Unit of the first row; all rows of one query share a sensor type
    pub fn unit(&self) -> &str {
        self.rows.first().map(|r| r.unit.as_str()).unwrap_or("")
    }

    /// Distinct locations in first-seen order
    pub fn locations(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.location.as_str()) {
                seen.push(&row.location);
            }
        }
        seen
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    /// Whether any row carries a quality flag other than `ok`
    pub fn has_quality_issues(&self) -> bool {
        self.rows.iter().any(|r| {
            r.quality_flag
                .as_deref()
                .is_some_and(|f| !f.eq_ignore_ascii_case("ok"))
        })
    }

    pub fn time_span(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.rows.iter().map(|r| r.timestamp).min()?;
        let last = self.rows.iter().map(|r| r.timestamp).max()?;
        Some((first, last))
    }
}

/// Parameters for one retrieval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuery {
    pub sensor_type: String,
    pub locations: Vec<String>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl DataQuery {
    pub fn from_spec(spec: &TaskSpecification) -> Self {
        Self {
            sensor_type: spec.sensor_type().to_string(),
            locations: spec.locations().to_vec(),
            start_time: spec.start_time(),
            end_time: spec.end_time(),
        }
    }
}
