//! Check a parsed task against what the catalog actually holds
//!
//! Every check runs; nothing short-circuits, so the user sees all problems
//! with a query at once. Messages name the offending value first and the
//! valid alternatives second.

use crate::catalog::SensorCatalog;
use crate::core::error::Result;
use crate::core::types::Timestamp;
use crate::llm::context::SystemContext;
use crate::llm::task::TaskSpecification;

/// How many known locations to suggest for an unknown one
pub const LOCATION_SUGGESTIONS: usize = 5;

pub struct ContextValidator;

impl ContextValidator {
    /// Validate `spec` against a catalog snapshot; empty means valid
    pub fn validate(spec: &TaskSpecification, context: &SystemContext) -> Vec<String> {
        let mut errors = Vec::new();

        if !context.has_sensor_type(spec.sensor_type()) {
            errors.push(format!(
                "Unknown sensor type '{}'. Available: {}",
                spec.sensor_type(),
                context.available_sensors.join(", ")
            ));
        }

        let missing: Vec<&str> = spec
            .locations()
            .iter()
            .filter(|loc| {
                !context
                    .available_locations
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(loc))
            })
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            let quoted: Vec<String> = missing.iter().map(|m| format!("'{}'", m)).collect();
            let mut suggestion = context
                .available_locations
                .iter()
                .take(LOCATION_SUGGESTIONS)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if context.available_locations.len() > LOCATION_SUGGESTIONS {
                suggestion.push_str(", ...");
            }
            errors.push(format!(
                "Unknown location(s) {}. Available: {}",
                quoted.join(", "),
                suggestion
            ));
        }

        let range = context.time_range;
        if spec.start_time() < range.start {
            errors.push(format!(
                "Start time {} is before available data (earliest: {})",
                day(spec.start_time()),
                day(range.start)
            ));
        }
        if spec.end_time() > range.end {
            errors.push(format!(
                "End time {} is after available data (latest: {})",
                day(spec.end_time()),
                day(range.end)
            ));
        }

        if spec.end_time() <= spec.start_time() {
            errors.push("End time must be after start time".to_string());
        }

        errors
    }

    /// Validate against a live catalog
    pub async fn validate_with_catalog(
        spec: &TaskSpecification,
        catalog: &SensorCatalog,
    ) -> Result<Vec<String>> {
        let context = catalog.system_context().await?;
        Ok(Self::validate(spec, &context))
    }
}

fn day(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TimeRange;
    use crate::llm::task::{IntentKind, Operation};
    use chrono::{TimeZone, Utc};

    fn context() -> SystemContext {
        SystemContext {
            available_sensors: vec!["humidity".into(), "temperature".into()],
            available_locations: (10..17).map(|n| format!("Node {}", n)).collect(),
            time_range: TimeRange::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap(),
            ),
        }
    }

    fn spec(sensor: &str, locations: &[&str], start_day: u32, end_day: u32) -> TaskSpecification {
        let intent = if locations.len() > 1 {
            IntentKind::Comparison
        } else {
            IntentKind::SingleQuery
        };
        TaskSpecification::new(
            intent,
            sensor,
            locations.iter().map(|s| s.to_string()).collect(),
            Utc.with_ymd_and_hms(2024, 3, start_day, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, end_day, 0, 0, 0).unwrap(),
            Operation::Mean,
            None,
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_spec_has_no_errors() {
        let errors = ContextValidator::validate(&spec("temperature", &["Node 15"], 1, 2), &context());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_location_match_ignores_case() {
        let errors = ContextValidator::validate(&spec("temperature", &["node 15"], 1, 2), &context());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_checks_do_not_short_circuit() {
        let errors = ContextValidator::validate(&spec("light", &["Node 100"], 1, 2), &context());
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0],
            "Unknown sensor type 'light'. Available: humidity, temperature"
        );
        assert_eq!(
            errors[1],
            "Unknown location(s) 'Node 100'. Available: Node 10, Node 11, Node 12, Node 13, Node 14, ..."
        );
    }

    #[test]
    fn test_missing_locations_reported_together() {
        let errors = ContextValidator::validate(
            &spec("temperature", &["Node 15", "Node 98", "Node 99"], 1, 2),
            &context(),
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Unknown location(s) 'Node 98', 'Node 99'."));
    }

    #[test]
    fn test_end_after_available_data() {
        let errors = ContextValidator::validate(&spec("temperature", &["Node 15"], 10, 20), &context());
        assert_eq!(
            errors,
            vec!["End time 2024-03-20 is after available data (latest: 2024-03-15)"]
        );
    }

    #[test]
    fn test_start_before_available_data() {
        let mut ctx = context();
        ctx.time_range.start = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let errors = ContextValidator::validate(&spec("temperature", &["Node 15"], 1, 6), &ctx);
        assert_eq!(
            errors,
            vec!["Start time 2024-03-01 is before available data (earliest: 2024-03-05)"]
        );
    }
}
