use rayon::prelude::*;

use std::collections::BTreeMap;

use crate::types::models::{EntityKey, EntityPeriodSummary, InequalityPoint, Metric, Period, Snapshot};

/// Added to every value so an all-zero distribution has a defined Gini.
pub const GINI_EPSILON: f64 = 1e-7;

pub const DEFAULT_NAKAMOTO_THRESHOLD: f64 = 0.33;

/// Gini coefficient in mean-difference form over a sorted shifted copy.
///
/// Negative inputs are shifted up by the minimum. Empty input yields 0.
pub fn gini(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let shift = if min < 0.0 { -min } else { 0.0 };
    let mut shifted: Vec<f64> = values.iter().map(|v| v + shift + GINI_EPSILON).collect();
    shifted.sort_by(f64::total_cmp);

    let n = shifted.len() as f64;
    let total: f64 = shifted.iter().sum();
    let weighted: f64 = shifted
        .iter()
        .enumerate()
        .map(|(i, v)| (2.0 * (i as f64 + 1.0) - n - 1.0) * v)
        .sum();

    weighted / (n * total)
}

/// Smallest number of largest entries whose combined share exceeds `threshold`.
pub fn nakamoto_coefficient(values: &[f64], threshold: f64) -> u32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let total: f64 = sorted.iter().sum();
    if sorted.is_empty() || total <= 0.0 {
        return 0;
    }

    let mut cumulative = 0.0;
    for (i, v) in sorted.iter().enumerate() {
        cumulative += v;
        if cumulative / total > threshold {
            return i as u32 + 1;
        }
    }
    sorted.len() as u32
}

fn top_share(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max) / total
}

#[derive(Debug, Clone, Copy)]
pub struct InequalityOptions {
    pub threshold: f64,
    /// Drop entities with a zero value before measuring.
    pub skip_zero: bool,
}

impl Default for InequalityOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_NAKAMOTO_THRESHOLD,
            skip_zero: false,
        }
    }
}

/// Inequality point over an already selected set of values.
pub fn measure(dataset: &str, period: Period, metric: Metric, values: &[f64], threshold: f64) -> InequalityPoint {
    InequalityPoint {
        dataset: dataset.to_string(),
        period,
        metric,
        gini: gini(values),
        nakamoto: nakamoto_coefficient(values, threshold),
        participants: values.len() as u32,
        total_value: values.iter().sum(),
        top_share: top_share(values),
    }
}

/// Inequality of one period's entity rows for one metric.
pub fn inequality_point(
    dataset: &str,
    period: Period,
    rows: &[EntityPeriodSummary],
    metric: Metric,
    options: &InequalityOptions,
) -> InequalityPoint {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| metric.value_of(row))
        .filter(|v| !options.skip_zero || *v != 0.0)
        .collect();

    measure(dataset, period, metric, &values, options.threshold)
}

/// Inequality of miner incentive within one subnet snapshot.
///
/// Only subjects with positive incentive take part. Values are shares of the
/// window's total incentive; `total_value` keeps the raw sum.
pub fn incentive_point(dataset: &str, period: Period, snapshot: &Snapshot, threshold: f64) -> InequalityPoint {
    let incentives: Vec<f64> = snapshot
        .records()
        .filter_map(|record| record.incentive())
        .filter(|v| *v > 0.0)
        .collect();
    let total: f64 = incentives.iter().sum();
    let shares: Vec<f64> = incentives.iter().map(|v| v / total).collect();

    let mut point = measure(dataset, period, Metric::Incentive, &shares, threshold);
    point.total_value = total;
    point
}

/// Inequality of active validator counts across entities.
pub fn validator_count_point(
    dataset: &str,
    period: Period,
    counts: &BTreeMap<EntityKey, u32>,
    threshold: f64,
) -> InequalityPoint {
    let values: Vec<f64> = counts.values().map(|c| *c as f64).filter(|c| *c > 0.0).collect();
    measure(dataset, period, Metric::Validators, &values, threshold)
}

/// Stake and reward inequality for every period.
///
/// Periods are independent here, so they are measured in parallel.
pub fn inequality_series(
    dataset: &str,
    periods: &[(Period, Vec<EntityPeriodSummary>)],
    options: &InequalityOptions,
) -> Vec<InequalityPoint> {
    periods
        .par_iter()
        .flat_map_iter(|(period, rows)| {
            Metric::ENTITY
                .into_iter()
                .map(move |metric| inequality_point(dataset, *period, rows, metric, options))
        })
        .collect()
}
