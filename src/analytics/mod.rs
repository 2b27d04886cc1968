//! Analytics over a provider's snapshot history.
//!
//! All entry points take a history ordered by fetch time for one provider
//! and return [`Analysis::Unavailable`] with a human-readable reason when
//! preconditions are unmet - never a crash, never a misleading zero.

pub mod anomaly;
pub mod cycles;
pub mod forecast;
pub mod reliability;

use serde::Serialize;

pub use anomaly::{AnomalyDirection, AnomalySeverity, AnomalySnapshot, detect_anomaly};
pub use cycles::{RESET_DROP_RATIO, detect_resets, latest_cycle};
pub use forecast::{BurnRateForecast, forecast};
pub use reliability::{ReliabilitySnapshot, reliability};

/// Result of an analytics computation.
///
/// Derived metrics are ephemeral and recomputed on demand; when the history
/// cannot support a metric the reason says why.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Analysis<T> {
    Available { value: T },
    Unavailable { reason: String },
}

impl<T> Analysis<T> {
    pub fn available(value: T) -> Self {
        Self::Available { value }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether a value was produced.
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Borrow the value when available.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Available { value } => Some(value),
            Self::Unavailable { .. } => None,
        }
    }

    /// Borrow the unavailability reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available { .. } => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

/// Median of a sorted-or-not slice; `None` when empty.
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(f64::midpoint(sorted[mid - 1], sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn analysis_accessors() {
        let available: Analysis<f64> = Analysis::available(1.5);
        assert!(available.is_available());
        assert_eq!(available.value(), Some(&1.5));
        assert_eq!(available.reason(), None);

        let unavailable: Analysis<f64> = Analysis::unavailable("not enough samples");
        assert!(!unavailable.is_available());
        assert_eq!(unavailable.reason(), Some("not enough samples"));
    }
}
