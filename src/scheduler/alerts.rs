//! Threshold alerting.
//!
//! A provider alerts when its effective consumed percentage crosses the
//! configured threshold. Quota providers report remaining share, so the
//! comparison always goes through [`UsageSnapshot::effective_used_percent`].

use tracing::warn;

use crate::core::models::{Preferences, ProviderConfig, UsageSnapshot};

/// One fired alert, handed to a [`NotificationSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct UsageAlert {
    pub provider_id: String,
    pub provider_name: String,
    pub effective_used_percent: f64,
    pub threshold: f64,
}

/// Delivery channel for fired alerts.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, alert: &UsageAlert);
}

/// Default sink: structured warning in the log stream.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, alert: &UsageAlert) {
        warn!(
            provider = %alert.provider_id,
            used_percent = alert.effective_used_percent,
            threshold = alert.threshold,
            "usage threshold exceeded"
        );
    }
}

/// Whether a snapshot should alert under the given preferences and provider
/// configuration.
///
/// All four conditions must hold: notifications globally enabled, the
/// provider opted in, the snapshot reachable, and effective usage at or over
/// the threshold. Unreachable snapshots never alert regardless of the stale
/// usage numbers they carry.
#[must_use]
pub fn should_alert(
    preferences: &Preferences,
    config: &ProviderConfig,
    snapshot: &UsageSnapshot,
) -> bool {
    preferences.notifications_enabled
        && config.notify
        && snapshot.is_available
        && snapshot.effective_used_percent() >= preferences.alert_threshold
}
