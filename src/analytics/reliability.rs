//! Provider reliability metrics.
//!
//! Unlike forecasting, reliability looks at the full untrimmed history: a
//! quota reset says nothing about whether the provider was reachable.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::models::UsageSnapshot;

use super::Analysis;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReliabilitySnapshot {
    pub total_polls: usize,
    pub successes: usize,
    pub failures: usize,
    /// Failed polls as a percentage of all polls.
    pub failure_rate_percent: f64,
    /// Mean latency over samples that recorded one.
    pub avg_latency_ms: Option<f64>,
    pub last_latency_ms: Option<u64>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_observation: Option<DateTime<Utc>>,
}

/// Summarize reachability and latency over an ordered history.
#[must_use]
pub fn reliability(history: &[UsageSnapshot]) -> Analysis<ReliabilitySnapshot> {
    if history.is_empty() {
        return Analysis::unavailable("no polls recorded");
    }

    let successes = history.iter().filter(|s| s.is_available).count();
    let failures = history.len() - successes;

    #[allow(clippy::cast_precision_loss)]
    let failure_rate_percent = failures as f64 / history.len() as f64 * 100.0;

    let latencies: Vec<u64> = history.iter().filter_map(|s| s.latency_ms).collect();
    #[allow(clippy::cast_precision_loss)]
    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    };
    let last_latency_ms = history.iter().rev().find_map(|s| s.latency_ms);

    let last_success = history
        .iter()
        .rev()
        .find(|s| s.is_available)
        .map(|s| s.fetched_at);
    let last_observation = history.last().map(|s| s.fetched_at);

    Analysis::available(ReliabilitySnapshot {
        total_polls: history.len(),
        successes,
        failures,
        failure_rate_percent,
        avg_latency_ms,
        last_latency_ms,
        last_success,
        last_observation,
    })
}
