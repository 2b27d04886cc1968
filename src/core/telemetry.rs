//! Refresh-cycle self-telemetry.
//!
//! A process-scoped counter object shared by `Arc`, initialized to all zeros.
//! Error rate is recomputed on read from the two counters, never stored.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared telemetry counters for the refresh scheduler.
#[derive(Debug, Default)]
pub struct RefreshTelemetry {
    refresh_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_latency_ms: AtomicU64,
    last_latency_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time read of the telemetry counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_rate_percent: f64,
    pub avg_latency_ms: f64,
    pub last_latency_ms: u64,
    pub last_error: Option<String>,
}

impl RefreshTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed refresh cycle.
    pub fn record_cycle(&self, success: bool, latency_ms: u64, error: Option<&str>) {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);

        if let Some(message) = error
            && let Ok(mut last) = self.last_error.lock()
        {
            *last = Some(message.to_string());
        }
    }

    /// Read all counters as one consistent-enough snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let count = self.refresh_count.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss)]
        let error_rate_percent = if count == 0 {
            0.0
        } else {
            failure_count as f64 / count as f64 * 100.0
        };

        #[allow(clippy::cast_precision_loss)]
        let avg_latency_ms = if count == 0 {
            0.0
        } else {
            total_latency as f64 / count as f64
        };

        TelemetrySnapshot {
            count,
            success_count,
            failure_count,
            error_rate_percent,
            avg_latency_ms,
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|g| g.clone()),
        }
    }
}
