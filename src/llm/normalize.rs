//! Synonym tables applied to model output before type validation
//!
//! Each table maps a lowercase, trimmed variant onto its canonical spelling.
//! New synonyms are new rows; the lookup code never changes. Values missing
//! from a table pass through (lowercased and trimmed) so that type validation
//! can reject them with the original wording.

/// Intent kind variants
pub const INTENT_SYNONYMS: &[(&str, &str)] = &[
    ("simple_query", "query"),
    ("single_query", "query"),
    ("temporal_query", "query"),
    ("simple", "query"),
    ("compare", "comparison"),
    ("comparison_query", "comparison"),
    ("spatial_comparison", "comparison"),
    ("temporal_aggregation", "aggregation"),
    ("aggregate", "aggregation"),
    ("time_series", "aggregation"),
];

/// Sensor type variants
pub const SENSOR_SYNONYMS: &[(&str, &str)] = &[
    ("temp", "temperature"),
    ("co2_concentration", "co2"),
    ("carbon_dioxide", "co2"),
    ("power", "energy"),
    ("occupant", "occupancy"),
    ("people_count", "occupancy"),
];

/// Operation variants
pub const OPERATION_SYNONYMS: &[(&str, &str)] = &[
    ("average", "mean"),
    ("avg", "mean"),
    ("maximum", "max"),
    ("minimum", "min"),
    ("total", "sum"),
    ("standard_deviation", "std"),
    ("stddev", "std"),
    ("num", "count"),
    ("number", "count"),
    ("cnt", "count"),
];

/// Aggregation level variants. An empty canonical value means "absent".
pub const AGGREGATION_SYNONYMS: &[(&str, &str)] = &[
    ("null", ""),
    ("none", ""),
    ("n/a", ""),
    ("na", ""),
    ("", ""),
    ("hour", "hourly"),
    ("day", "daily"),
    ("week", "weekly"),
];

/// Look `raw` up in `table`, returning the canonical form or the cleaned input
pub fn canonicalize(table: &[(&str, &str)], raw: &str) -> String {
    let cleaned = raw.trim().to_lowercase();
    table
        .iter()
        .find(|(variant, _)| *variant == cleaned)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(cleaned)
}

pub fn intent(raw: &str) -> String {
    canonicalize(INTENT_SYNONYMS, raw)
}

pub fn sensor_type(raw: &str) -> String {
    canonicalize(SENSOR_SYNONYMS, raw)
}

pub fn operation(raw: &str) -> String {
    canonicalize(OPERATION_SYNONYMS, raw)
}

/// `None` when the level is one of the "absent" spellings
pub fn aggregation_level(raw: &str) -> Option<String> {
    let canonical = canonicalize(AGGREGATION_SYNONYMS, raw);
    if canonical.is_empty() {
        None
    } else {
        Some(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_synonyms() {
        assert_eq!(operation("avg"), "mean");
        assert_eq!(operation("  Average "), "mean");
        assert_eq!(operation("STDDEV"), "std");
        assert_eq!(operation("cnt"), "count");
        assert_eq!(operation("median"), "median");
    }

    #[test]
    fn test_aggregation_absent_spellings() {
        for raw in ["none", "null", "", "N/A", " na "] {
            assert_eq!(aggregation_level(raw), None, "{:?} should be absent", raw);
        }
        assert_eq!(aggregation_level("Day").as_deref(), Some("daily"));
        assert_eq!(aggregation_level("weekly").as_deref(), Some("weekly"));
        assert_eq!(aggregation_level("monthly").as_deref(), Some("monthly"));
    }

    #[test]
    fn test_intent_synonyms() {
        assert_eq!(intent("Simple_Query"), "query");
        assert_eq!(intent("spatial_comparison"), "comparison");
        assert_eq!(intent("time_series"), "aggregation");
        assert_eq!(intent("comparison"), "comparison");
    }

    #[test]
    fn test_sensor_synonyms() {
        assert_eq!(sensor_type("Temp"), "temperature");
        assert_eq!(sensor_type("carbon_dioxide"), "co2");
        assert_eq!(sensor_type("people_count"), "occupancy");
        assert_eq!(sensor_type(" Humidity "), "humidity");
    }

    #[test]
    fn test_tables_have_no_duplicate_variants() {
        for table in [
            INTENT_SYNONYMS,
            SENSOR_SYNONYMS,
            OPERATION_SYNONYMS,
            AGGREGATION_SYNONYMS,
        ] {
            let mut seen = ahash::AHashSet::new();
            for (variant, _) in table {
                assert!(seen.insert(*variant), "duplicate variant {:?}", variant);
            }
        }
    }
}
