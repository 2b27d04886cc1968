//! Quota-reset-cycle segmentation.
//!
//! Walks an ordered history and treats a large drop in `used` as the start
//! of a new billing cycle. Forecasting and anomaly detection operate only on
//! the latest cycle's samples.

use chrono::Utc;

use crate::core::models::{ResetEvent, ResetType, UsageSnapshot};

/// A drop of at least this fraction of the prior sample's
/// `max(used, available)` marks a cycle boundary. Empirically chosen; keep
/// in sync with what production data was tuned against.
pub const RESET_DROP_RATIO: f64 = 0.2;

fn is_reset(prev: &UsageSnapshot, curr: &UsageSnapshot) -> bool {
    let reference = prev.used.max(prev.available);
    reference > 0.0 && (prev.used - curr.used) >= RESET_DROP_RATIO * reference
}

/// The samples belonging to the most recent billing cycle.
///
/// Everything before the last detected reset point is discarded.
#[must_use]
pub fn latest_cycle(history: &[UsageSnapshot]) -> &[UsageSnapshot] {
    let mut start = 0;
    for (i, pair) in history.windows(2).enumerate() {
        if is_reset(&pair[0], &pair[1]) {
            start = i + 1;
        }
    }
    &history[start..]
}

/// All reset events detectable in the history, in order.
#[must_use]
pub fn detect_resets(history: &[UsageSnapshot]) -> Vec<ResetEvent> {
    history
        .windows(2)
        .filter(|pair| is_reset(&pair[0], &pair[1]))
        .map(|pair| ResetEvent {
            provider_id: pair[1].provider_id.clone(),
            previous_usage: pair[0].used,
            new_usage: pair[1].used,
            reset_type: ResetType::QuotaCycle,
            detected_at: Utc::now(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn history(used_values: &[f64]) -> Vec<UsageSnapshot> {
        let base = Utc::now() - Duration::hours(used_values.len() as i64);
        used_values
            .iter()
            .enumerate()
            .map(|(i, &used)| {
                let mut snap =
                    UsageSnapshot::new("test", "Test").with_usage(used, 100.0, used);
                snap.fetched_at = base + Duration::hours(i as i64);
                snap
            })
            .collect()
    }

    #[test]
    fn drop_past_threshold_starts_new_cycle() {
        let history = history(&[90.0, 92.0, 95.0, 5.0, 8.0]);
        let cycle = latest_cycle(&history);
        assert_eq!(cycle.len(), 2);
        assert!((cycle[0].used - 5.0).abs() < f64::EPSILON);
        assert!((cycle[1].used - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn small_dip_is_not_a_reset() {
        let history = history(&[50.0, 55.0, 48.0, 60.0]);
        assert_eq!(latest_cycle(&history).len(), 4);
        assert!(detect_resets(&history).is_empty());
    }

    #[test]
    fn multiple_resets_keep_only_latest_segment() {
        let history = history(&[80.0, 5.0, 70.0, 3.0, 10.0]);
        let cycle = latest_cycle(&history);
        assert_eq!(cycle.len(), 2);
        assert!((cycle[0].used - 3.0).abs() < f64::EPSILON);

        let resets = detect_resets(&history);
        assert_eq!(resets.len(), 2);
        assert!((resets[0].previous_usage - 80.0).abs() < f64::EPSILON);
        assert!((resets[1].new_usage - 3.0).abs() < f64::EPSILON);
        assert_eq!(resets[0].reset_type, ResetType::QuotaCycle);
    }

    #[test]
    fn empty_and_single_histories_pass_through() {
        assert!(latest_cycle(&[]).is_empty());
        let one = history(&[42.0]);
        assert_eq!(latest_cycle(&one).len(), 1);
    }
}
