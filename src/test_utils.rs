//! Test utilities for quotawatch.
//!
//! Shared test data factories for use across unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use quotawatch::test_utils::*;
//!
//! let snapshot = make_test_snapshot("openai", 42.0);
//! let history = make_test_history("openai", &[10.0, 20.0, 30.0]);
//! ```

use chrono::{Duration, Utc};

use crate::core::models::{BillingModel, Preferences, ProviderConfig, UsageSnapshot};

// =============================================================================
// Test Data Factories
// =============================================================================

/// Create a reachable usage-billing snapshot with the given consumed
/// percentage against an available budget of 100.
#[must_use]
pub fn make_test_snapshot(provider_id: &str, used: f64) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new(provider_id, provider_id.to_ascii_uppercase())
        .with_usage(used, 100.0, used);
    snapshot.latency_ms = Some(150);
    snapshot.auth_source = "Environment Variable".to_string();
    snapshot
}

/// Create an unreachable snapshot with a standard failure description.
#[must_use]
pub fn make_unreachable_snapshot(provider_id: &str) -> UsageSnapshot {
    UsageSnapshot::unavailable(
        provider_id,
        provider_id.to_ascii_uppercase(),
        "connection failed",
    )
}

/// Create an ordered history from `used` values spaced one hour apart,
/// ending now.
#[must_use]
pub fn make_test_history(provider_id: &str, used_values: &[f64]) -> Vec<UsageSnapshot> {
    #[allow(clippy::cast_possible_wrap)]
    let base = Utc::now() - Duration::hours(used_values.len() as i64);
    used_values
        .iter()
        .enumerate()
        .map(|(i, &used)| {
            let mut snapshot = make_test_snapshot(provider_id, used);
            #[allow(clippy::cast_possible_wrap)]
            {
                snapshot.fetched_at = base + Duration::hours(i as i64 + 1);
            }
            snapshot
        })
        .collect()
}

/// Create a provider configuration with a key and notifications enabled.
#[must_use]
pub fn make_test_config(provider_id: &str) -> ProviderConfig {
    let mut config = ProviderConfig::new(provider_id);
    config.api_key = format!("sk-test-{provider_id}");
    config.billing = BillingModel::Usage;
    config.notify = true;
    config.auth_source = "Manual".to_string();
    config
}

/// Preferences with a custom alert threshold, everything else default.
#[must_use]
pub fn make_test_preferences(alert_threshold: f64) -> Preferences {
    Preferences {
        alert_threshold,
        ..Preferences::default()
    }
}
