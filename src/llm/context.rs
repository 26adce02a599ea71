//! Catalog context for LLM prompts
//!
//! The model can only produce sensor types and locations that exist if it is
//! told what exists. `SystemContext` is a snapshot of the catalog taken right
//! before interpretation and doubles as the input to context validation.

use serde::Serialize;

use crate::core::types::TimeRange;

/// What the catalog currently offers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemContext {
    /// Normalized sensor types, sorted
    pub available_sensors: Vec<String>,
    /// Human-readable locations, sorted
    pub available_locations: Vec<String>,
    /// Span of available data
    pub time_range: TimeRange,
}

impl SystemContext {
    /// Render the context for inclusion in a prompt
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str(&format!(
            "Available sensors: {}\n",
            self.available_sensors.join(", ")
        ));
        s.push_str(&format!(
            "Available locations: {}\n",
            self.available_locations.join(", ")
        ));
        s.push_str(&format!(
            "Data available from: {} to {}\n",
            self.time_range.start.format("%Y-%m-%d"),
            self.time_range.end.format("%Y-%m-%d")
        ));

        s
    }

    pub fn has_sensor_type(&self, sensor_type: &str) -> bool {
        self.available_sensors.iter().any(|s| s == sensor_type)
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.available_locations.iter().any(|l| l == location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn context() -> SystemContext {
        SystemContext {
            available_sensors: vec!["co2".into(), "temperature".into()],
            available_locations: vec!["Node 15".into(), "Node 16".into()],
            time_range: TimeRange::new(
                Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
            ),
        }
    }

    #[test]
    fn test_summary_lines() {
        let summary = context().summary();
        assert!(summary.contains("Available sensors: co2, temperature\n"));
        assert!(summary.contains("Available locations: Node 15, Node 16\n"));
        assert!(summary.contains("Data available from: 2019-05-01 to 2024-03-15\n"));
    }

    #[test]
    fn test_membership_is_exact() {
        let ctx = context();
        assert!(ctx.has_sensor_type("co2"));
        assert!(!ctx.has_sensor_type("CO2"));
        assert!(ctx.has_location("Node 16"));
        assert!(!ctx.has_location("Node 1"));
    }
}
