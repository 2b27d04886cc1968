//! Burn-rate forecasting.
//!
//! Estimates units-per-day consumption over the latest billing cycle and
//! projects the exhaustion time of the remaining budget.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::core::models::UsageSnapshot;

use super::{Analysis, cycles};

/// Minimum elapsed time between the first and last cycle sample.
const MIN_SPAN_HOURS: i64 = 1;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Burn-rate forecast derived from the latest cycle.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BurnRateForecast {
    /// Consumption units per day, from positive deltas only.
    pub units_per_day: f64,
    /// Remaining budget, `max(0, available - used)` at the last sample.
    pub remaining: f64,
    pub days_until_exhausted: f64,
    pub estimated_exhaustion: DateTime<Utc>,
    /// Samples in the cycle the forecast was computed from.
    pub sample_count: usize,
}

/// Forecast burn rate from an ordered snapshot history.
#[must_use]
pub fn forecast(history: &[UsageSnapshot]) -> Analysis<BurnRateForecast> {
    let cycle = cycles::latest_cycle(history);

    if cycle.len() < 2 {
        return Analysis::unavailable("need at least 2 samples in the current cycle");
    }

    let first = &cycle[0];
    let last = &cycle[cycle.len() - 1];
    let span = last.fetched_at.signed_duration_since(first.fetched_at);
    if span < Duration::hours(MIN_SPAN_HOURS) {
        return Analysis::unavailable("need at least 1 hour of samples in the current cycle");
    }

    let consumed: f64 = cycle
        .windows(2)
        .map(|pair| (pair[1].used - pair[0].used).max(0.0))
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let elapsed_days = span.num_seconds() as f64 / SECONDS_PER_DAY;
    let units_per_day = consumed / elapsed_days;

    if !units_per_day.is_finite() || units_per_day <= 0.0 {
        return Analysis::unavailable("usage is flat over the current cycle");
    }

    let remaining = (last.available - last.used).max(0.0);
    let days_until_exhausted = if remaining <= 0.0 {
        0.0
    } else {
        remaining / units_per_day
    };

    // A huge budget over a tiny rate can overflow chrono's range; pin the
    // projection to the far end of the representable timeline instead.
    #[allow(clippy::cast_possible_truncation)]
    let offset_seconds = (days_until_exhausted * SECONDS_PER_DAY).min(i64::MAX as f64) as i64;
    let estimated_exhaustion = Duration::try_seconds(offset_seconds)
        .and_then(|offset| last.fetched_at.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    Analysis::available(BurnRateForecast {
        units_per_day,
        remaining,
        days_until_exhausted,
        estimated_exhaustion,
        sample_count: cycle.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(hours_ago: i64, used: f64, available: f64) -> UsageSnapshot {
        let mut snap = UsageSnapshot::new("test", "Test").with_usage(used, available, 0.0);
        snap.fetched_at = Utc::now() - Duration::hours(hours_ago);
        snap
    }

    #[test]
    fn empty_and_single_sample_histories_are_unavailable() {
        assert!(!forecast(&[]).is_available());
        assert!(!forecast(&[sample(0, 10.0, 100.0)]).is_available());
    }

    #[test]
    fn flat_history_is_unavailable() {
        let history = vec![sample(48, 30.0, 100.0), sample(24, 30.0, 100.0), sample(0, 30.0, 100.0)];
        let result = forecast(&history);
        assert_eq!(result.reason(), Some("usage is flat over the current cycle"));
    }

    #[test]
    fn sub_hour_span_is_unavailable() {
        let history = vec![
            {
                let mut s = sample(0, 10.0, 100.0);
                s.fetched_at = Utc::now() - Duration::minutes(30);
                s
            },
            sample(0, 20.0, 100.0),
        ];
        let result = forecast(&history);
        assert!(result.reason().unwrap().contains("1 hour"));
    }

    #[test]
    fn ten_units_over_one_day_leaves_eight_days() {
        let history = vec![sample(24, 10.0, 100.0), sample(0, 20.0, 100.0)];
        let result = forecast(&history);
        let value = result.value().expect("forecast available");
        assert!((value.units_per_day - 10.0).abs() < 1e-9);
        assert!((value.remaining - 80.0).abs() < 1e-9);
        assert!((value.days_until_exhausted - 8.0).abs() < 1e-9);
    }

    #[test]
    fn exhausted_budget_reports_zero_days() {
        let history = vec![sample(24, 90.0, 100.0), sample(0, 100.0, 100.0)];
        let value = forecast(&history).value().cloned().expect("available");
        assert!(value.days_until_exhausted.abs() < f64::EPSILON);
        assert!(value.remaining.abs() < f64::EPSILON);
    }

    #[test]
    fn enormous_remaining_budget_saturates_instead_of_panicking() {
        // 1e18 units left at 10 units/day projects far past chrono's range.
        let history = vec![sample(24, 10.0, 1e18), sample(0, 20.0, 1e18)];
        let value = forecast(&history).value().cloned().expect("available");
        assert!((value.units_per_day - 10.0).abs() < 1e-9);
        assert!(value.days_until_exhausted > 1e16);
        assert_eq!(value.estimated_exhaustion, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn forecast_ignores_samples_before_a_reset() {
        // Heavy consumption before the reset must not leak into the rate.
        let history = vec![
            sample(72, 80.0, 100.0),
            sample(49, 95.0, 100.0),
            sample(48, 2.0, 100.0),
            sample(0, 6.0, 100.0),
        ];
        let value = forecast(&history).value().cloned().expect("available");
        // 4 units over 2 days.
        assert!((value.units_per_day - 2.0).abs() < 1e-9);
        assert_eq!(value.sample_count, 2);
    }
}
