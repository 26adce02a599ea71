//! Tool registry: built once at startup and injected into the workflow engine

use std::time::Instant;

use tracing::debug;

use crate::analytics::{tools, AnalyticsResult, ToolKind, ToolParams};
use crate::data::Dataset;
use crate::llm::task::{IntentKind, TaskSpecification};

/// Runs statistics over retrieved data
pub trait StatisticsEngine: Send + Sync {
    /// Tool that answers `spec`, or `None` when it is not registered
    fn tool_for(&self, spec: &TaskSpecification) -> Option<ToolKind>;

    fn execute(&self, tool: ToolKind, data: &Dataset, params: &ToolParams) -> AnalyticsResult;
}

/// The set of tools available to a workflow engine
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolKind>,
}

impl ToolRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every tool registered
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        for kind in ToolKind::ALL {
            registry.register(kind);
        }
        registry
    }

    pub fn register(&mut self, kind: ToolKind) {
        if !self.tools.contains(&kind) {
            self.tools.push(kind);
        }
    }

    pub fn is_registered(&self, kind: ToolKind) -> bool {
        self.tools.contains(&kind)
    }
}

impl StatisticsEngine for ToolRegistry {
    /// Picks by intent alone. `StatisticalSummary` has no intent of its own,
    /// so it is never selected here and only runs when named in `execute`.
    fn tool_for(&self, spec: &TaskSpecification) -> Option<ToolKind> {
        let kind = match spec.intent() {
            IntentKind::Comparison => ToolKind::SpatialComparison,
            IntentKind::Aggregation => ToolKind::TemporalAggregation,
            IntentKind::SingleQuery => ToolKind::TemporalStatistic,
        };
        self.is_registered(kind).then_some(kind)
    }

    fn execute(&self, tool: ToolKind, data: &Dataset, params: &ToolParams) -> AnalyticsResult {
        if !self.is_registered(tool) {
            return AnalyticsResult::failure(format!("Tool '{}' is not registered", tool));
        }

        let started = Instant::now();
        let mut result = match tool {
            ToolKind::TemporalStatistic => tools::temporal_statistic(data, params),
            ToolKind::TemporalAggregation => tools::temporal_aggregation(data, params),
            ToolKind::SpatialComparison => tools::spatial_comparison(data, params),
            ToolKind::StatisticalSummary => tools::statistical_summary(data, params),
        };
        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(
            tool = tool.name(),
            rows = data.len(),
            success = result.success,
            elapsed_ms = result.execution_time_ms,
            "Tool executed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::ResultValue;
    use crate::data::Reading;
    use crate::llm::task::{AggregationLevel, Operation};
    use chrono::{TimeZone, Utc};

    fn spec(intent: IntentKind) -> TaskSpecification {
        let (locations, level) = match intent {
            IntentKind::Comparison => (vec!["Node 15".into(), "Node 16".into()], None),
            IntentKind::Aggregation => (vec!["Node 15".into()], Some(AggregationLevel::Daily)),
            IntentKind::SingleQuery => (vec!["Node 15".into()], None),
        };
        TaskSpecification::new(
            intent,
            "temperature",
            locations,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
            Operation::Max,
            level,
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn test_tool_selection_by_intent() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(
            registry.tool_for(&spec(IntentKind::SingleQuery)),
            Some(ToolKind::TemporalStatistic)
        );
        assert_eq!(
            registry.tool_for(&spec(IntentKind::Comparison)),
            Some(ToolKind::SpatialComparison)
        );
        assert_eq!(
            registry.tool_for(&spec(IntentKind::Aggregation)),
            Some(ToolKind::TemporalAggregation)
        );
    }

    #[test]
    fn test_unregistered_tool_is_absent() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolKind::SpatialComparison);
        assert_eq!(registry.tool_for(&spec(IntentKind::SingleQuery)), None);

        let params = ToolParams::from_spec(&spec(IntentKind::SingleQuery));
        let result = registry.execute(ToolKind::TemporalStatistic, &Dataset::default(), &params);
        assert!(!result.success);
    }

    #[test]
    fn test_summary_runs_only_when_named() {
        let registry = ToolRegistry::with_default_tools();
        for intent in [IntentKind::SingleQuery, IntentKind::Comparison, IntentKind::Aggregation] {
            assert_ne!(registry.tool_for(&spec(intent)), Some(ToolKind::StatisticalSummary));
        }

        let reading = |value: f64| Reading {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            value,
            unit: "°C".into(),
            location: "Node 15".into(),
            quality_flag: None,
        };
        let data = Dataset::new(vec![reading(20.0), reading(24.0)]);
        let params = ToolParams::from_spec(&spec(IntentKind::SingleQuery));
        let result = registry.execute(ToolKind::StatisticalSummary, &data, &params);
        assert!(result.success);
        assert!(matches!(result.value, ResultValue::Summary(ref stats) if stats.count == 2));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ToolRegistry::with_default_tools();
        registry.register(ToolKind::TemporalStatistic);
        assert_eq!(registry.tools.len(), 4);
        assert!(ToolKind::ALL.into_iter().all(|k| registry.is_registered(k)));
    }
}
