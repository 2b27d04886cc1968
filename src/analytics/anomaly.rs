//! Burn-rate anomaly detection.
//!
//! Compares the most recent per-interval consumption rate against a robust
//! baseline (median + MAD) built from the earlier intervals of the same
//! cycle. Robust statistics keep a single past outlier from poisoning the
//! baseline the way a mean/stddev pair would.

use serde::Serialize;

use crate::core::models::UsageSnapshot;

use super::{Analysis, cycles, median};

/// Samples required in the current cycle before detection runs.
const MIN_CYCLE_SAMPLES: usize = 4;

/// Interval rates required (baseline needs at least two, plus the latest).
const MIN_RATES: usize = 3;

/// Consistency constant scaling MAD to a stddev-comparable unit for
/// normally-distributed data.
const MAD_SCALE: f64 = 1.482_6;

/// Deviation threshold, in robust sigmas.
const SIGMA_THRESHOLD: f64 = 3.0;

/// Sigma reported when the baseline has no spread at all.
const DEGENERATE_SIGMA: f64 = 999.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyDirection {
    Spike,
    Drop,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySnapshot {
    pub is_anomalous: bool,
    /// Units per day over the most recent interval.
    pub latest_rate: f64,
    /// Median of the earlier interval rates.
    pub baseline_rate: f64,
    /// Deviation of the latest rate in robust sigmas. 999 signals a
    /// zero-spread baseline where sigma is not meaningful.
    pub sigma: f64,
    pub severity: AnomalySeverity,
    pub direction: AnomalyDirection,
    pub interval_count: usize,
}

fn severity_for(sigma: f64) -> AnomalySeverity {
    if sigma >= 6.0 {
        AnomalySeverity::High
    } else if sigma >= 4.0 {
        AnomalySeverity::Medium
    } else {
        AnomalySeverity::Low
    }
}

/// Per-interval consumption rates in units per day.
fn interval_rates(cycle: &[UsageSnapshot]) -> Vec<f64> {
    cycle
        .windows(2)
        .filter_map(|pair| {
            let elapsed = pair[1]
                .fetched_at
                .signed_duration_since(pair[0].fetched_at)
                .num_seconds();
            if elapsed <= 0 {
                return None;
            }
            #[allow(clippy::cast_precision_loss)]
            let days = elapsed as f64 / SECONDS_PER_DAY;
            Some((pair[1].used - pair[0].used) / days)
        })
        .collect()
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Detect whether the latest consumption interval is anomalous.
#[must_use]
pub fn detect_anomaly(history: &[UsageSnapshot]) -> Analysis<AnomalySnapshot> {
    let cycle = cycles::latest_cycle(history);
    if cycle.len() < MIN_CYCLE_SAMPLES {
        return Analysis::unavailable("need at least 4 samples in the current cycle");
    }

    let rates = interval_rates(cycle);
    if rates.len() < MIN_RATES {
        return Analysis::unavailable("need at least 3 usable intervals in the current cycle");
    }

    let latest_rate = rates[rates.len() - 1];
    let baseline_rates = &rates[..rates.len() - 1];
    let Some(baseline_rate) = median(baseline_rates) else {
        return Analysis::unavailable("baseline could not be computed");
    };

    let delta = latest_rate - baseline_rate;
    let direction = if delta >= 0.0 {
        AnomalyDirection::Spike
    } else {
        AnomalyDirection::Drop
    };
    // Absolute floor keeps trivial wiggles on a near-zero baseline quiet.
    let min_delta = 1.0_f64.max(0.25 * baseline_rate.abs());

    let deviations: Vec<f64> = baseline_rates
        .iter()
        .map(|r| (r - baseline_rate).abs())
        .collect();
    let mad = median(&deviations).unwrap_or(0.0);
    let mut scale = MAD_SCALE * mad;
    if scale < f64::EPSILON {
        scale = stddev(baseline_rates);
    }

    if scale < f64::EPSILON {
        // Perfectly uniform baseline: any real movement stands out, but a
        // finite sigma would be meaningless. Flag on magnitude alone.
        let is_anomalous = delta.abs() > 2.0 * min_delta;
        return Analysis::available(AnomalySnapshot {
            is_anomalous,
            latest_rate,
            baseline_rate,
            sigma: DEGENERATE_SIGMA,
            severity: AnomalySeverity::High,
            direction,
            interval_count: rates.len(),
        });
    }

    let sigma = delta.abs() / scale;
    let is_anomalous = sigma >= SIGMA_THRESHOLD && delta.abs() >= min_delta;

    Analysis::available(AnomalySnapshot {
        is_anomalous,
        latest_rate,
        baseline_rate,
        sigma,
        severity: severity_for(sigma),
        direction,
        interval_count: rates.len(),
    })
}
