//! Tool bodies. Pure functions over a dataset.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, DurationRound, NaiveTime, TimeZone, Utc};
use ordered_float::OrderedFloat;

use crate::analytics::{
    AnalyticsResult, LocationValue, PeriodValue, ResultValue, SummaryStats, ToolParams,
};
use crate::core::types::Timestamp;
use crate::data::Dataset;
use crate::llm::task::{AggregationLevel, Operation};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().map(OrderedFloat).min().map(|v| v.0)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().map(OrderedFloat).max().map(|v| v.0)
}

/// Apply `op`; `None` when the operation is undefined for this many values
pub fn apply(op: Operation, values: &[f64]) -> Option<f64> {
    match op {
        Operation::Mean => mean(values),
        Operation::Max => max(values),
        Operation::Min => min(values),
        Operation::Sum => Some(values.iter().sum()),
        Operation::Std => sample_std(values),
        Operation::Count => Some(values.len() as f64),
    }
}

/// Quantile of sorted values with linear interpolation between ranks
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Start of the bucket containing `ts`. Weeks start on Monday 00:00 UTC.
pub fn bucket_start(ts: Timestamp, level: AggregationLevel) -> Timestamp {
    let midnight = Utc.from_utc_datetime(&ts.date_naive().and_time(NaiveTime::MIN));
    match level {
        AggregationLevel::Hourly => ts.duration_trunc(Duration::hours(1)).unwrap_or(ts),
        AggregationLevel::Daily => midnight,
        AggregationLevel::Weekly => {
            midnight - Duration::days(i64::from(ts.weekday().num_days_from_monday()))
        }
    }
}

fn undefined(op: Operation, n: usize) -> AnalyticsResult {
    AnalyticsResult::failure(format!(
        "Cannot compute {} over {} value(s)",
        op, n
    ))
}

/// One statistic over every row
pub fn temporal_statistic(data: &Dataset, params: &ToolParams) -> AnalyticsResult {
    let values = data.values();
    if values.is_empty() {
        return AnalyticsResult::failure("No data to analyze");
    }

    let Some(value) = apply(params.operation, &values) else {
        return undefined(params.operation, values.len());
    };

    AnalyticsResult::success(ResultValue::Scalar(value), data.unit())
        .with_meta("operation", params.operation.as_str())
        .with_meta("std_dev", sample_std(&values))
        .with_meta("min", min(&values))
        .with_meta("max", max(&values))
        .with_meta("sample_size", values.len())
}

/// One statistic per time bucket, plus the statistic over all rows
pub fn temporal_aggregation(data: &Dataset, params: &ToolParams) -> AnalyticsResult {
    let Some(level) = params.aggregation_level else {
        return AnalyticsResult::failure("Invalid aggregation_level: none");
    };
    if data.is_empty() {
        return AnalyticsResult::failure("No data to analyze");
    }

    let mut buckets: BTreeMap<Timestamp, Vec<f64>> = BTreeMap::new();
    for row in &data.rows {
        buckets
            .entry(bucket_start(row.timestamp, level))
            .or_default()
            .push(row.value);
    }

    let periods: Vec<PeriodValue> = buckets
        .into_iter()
        .filter_map(|(period_start, values)| {
            apply(params.operation, &values).map(|value| PeriodValue {
                period_start,
                value,
            })
        })
        .collect();

    if periods.is_empty() {
        return undefined(params.operation, data.len());
    }

    let overall = apply(params.operation, &data.values());
    let num_periods = periods.len();

    AnalyticsResult::success(ResultValue::Series(periods), data.unit())
        .with_meta("aggregation_level", level.as_str())
        .with_meta("operation", params.operation.as_str())
        .with_meta("num_periods", num_periods)
        .with_meta("overall_aggregate", overall)
}

/// One statistic per location, ranked highest first
pub fn spatial_comparison(data: &Dataset, params: &ToolParams) -> AnalyticsResult {
    if data.is_empty() {
        return AnalyticsResult::failure("No data to analyze");
    }

    let mut ranking = Vec::new();
    for location in data.locations() {
        let values: Vec<f64> = data
            .rows
            .iter()
            .filter(|r| r.location == location)
            .map(|r| r.value)
            .collect();
        let Some(value) = apply(params.operation, &values) else {
            return AnalyticsResult::failure(format!(
                "Cannot compute {} for {} over {} value(s)",
                params.operation,
                location,
                values.len()
            ));
        };
        ranking.push(LocationValue {
            location: location.to_string(),
            value,
            rank: 0,
            percent_of_highest: None,
        });
    }

    ranking.sort_by_key(|l| std::cmp::Reverse(OrderedFloat(l.value)));
    let highest = ranking[0].value;
    for (i, entry) in ranking.iter_mut().enumerate() {
        entry.rank = i + 1;
        if highest != 0.0 {
            entry.percent_of_highest = Some(entry.value / highest * 100.0);
        }
    }

    let num_locations = ranking.len();
    AnalyticsResult::success(ResultValue::Ranking(ranking), data.unit())
        .with_meta("operation", params.operation.as_str())
        .with_meta("num_locations", num_locations)
}

/// Count, mean, spread, quartiles, skewness and excess kurtosis
pub fn statistical_summary(data: &Dataset, _params: &ToolParams) -> AnalyticsResult {
    let mut sorted = data.values();
    if sorted.is_empty() {
        return AnalyticsResult::failure("No data to analyze");
    }
    sorted.sort_by_key(|v| OrderedFloat(*v));

    let n = sorted.len() as f64;
    let m = sorted.iter().sum::<f64>() / n;
    let moment = |k: i32| sorted.iter().map(|v| (v - m).powi(k)).sum::<f64>() / n;
    let m2 = moment(2);
    let (skewness, kurtosis) = if m2 > 0.0 {
        (
            Some(moment(3) / m2.powf(1.5)),
            Some(moment(4) / (m2 * m2) - 3.0),
        )
    } else {
        (None, None)
    };

    let summary = SummaryStats {
        count: sorted.len(),
        mean: m,
        std: sample_std(&sorted),
        min: sorted[0],
        q1: quantile(&sorted, 0.25).unwrap_or(m),
        median: quantile(&sorted, 0.5).unwrap_or(m),
        q3: quantile(&sorted, 0.75).unwrap_or(m),
        max: sorted[sorted.len() - 1],
        skewness,
        kurtosis,
    };

    AnalyticsResult::success(ResultValue::Summary(summary), data.unit())
        .with_meta("operation", "summary")
}
