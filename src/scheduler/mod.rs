//! Refresh scheduler.
//!
//! Drives the periodic poll -> persist -> evaluate loop. A single-permit
//! semaphore gates refresh cycles: a trigger arriving while a cycle runs is
//! skipped rather than queued, so manual triggers and the timer can never
//! stack overlapping polls of the same providers.

pub mod alerts;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info};

use crate::core::models::{Preferences, ProviderConfig, UsageSnapshot};
use crate::core::telemetry::{RefreshTelemetry, TelemetrySnapshot};
use crate::error::Result;
use crate::orchestrator::UsageOrchestrator;
use crate::storage::SnapshotHistory;

pub use alerts::{LogNotifier, NotificationSink, UsageAlert, should_alert};

/// Where the scheduler currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Polling,
    Persisting,
    Evaluating,
}

pub struct RefreshScheduler {
    orchestrator: Arc<UsageOrchestrator>,
    history: Arc<dyn SnapshotHistory>,
    notifier: Arc<dyn NotificationSink>,
    configs: RwLock<Vec<ProviderConfig>>,
    preferences: RwLock<Preferences>,
    // One permit: concurrent triggers coalesce into the running cycle.
    gate: Semaphore,
    telemetry: RefreshTelemetry,
    phase: Mutex<SchedulerPhase>,
    // Providers currently latched over the threshold, keyed by lowercase id.
    alerted: Mutex<HashSet<String>>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(
        orchestrator: UsageOrchestrator,
        history: Arc<dyn SnapshotHistory>,
        notifier: Arc<dyn NotificationSink>,
        configs: Vec<ProviderConfig>,
        preferences: Preferences,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            history,
            notifier,
            configs: RwLock::new(configs),
            preferences: RwLock::new(preferences),
            gate: Semaphore::new(1),
            telemetry: RefreshTelemetry::new(),
            phase: Mutex::new(SchedulerPhase::Idle),
            alerted: Mutex::new(HashSet::new()),
        }
    }

    /// Current cycle phase.
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
            .lock()
            .map_or(SchedulerPhase::Idle, |guard| *guard)
    }

    /// Point-in-time read of the refresh counters.
    #[must_use]
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub async fn update_configs(&self, configs: Vec<ProviderConfig>) {
        *self.configs.write().await = configs;
    }

    pub async fn update_preferences(&self, preferences: Preferences) {
        *self.preferences.write().await = preferences;
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        if let Ok(mut guard) = self.phase.lock() {
            *guard = phase;
        }
    }

    /// Run one refresh cycle end to end.
    ///
    /// Returns `Ok(false)` when another cycle is already running; the caller
    /// gets the running cycle's results through history like everyone else.
    ///
    /// # Errors
    /// Never fails outright: storage errors are absorbed into telemetry so a
    /// transient disk problem cannot kill the polling loop.
    pub async fn refresh_once(&self) -> Result<bool> {
        let Ok(_permit) = self.gate.try_acquire() else {
            debug!("refresh already in progress, skipping trigger");
            return Ok(false);
        };

        let started = Instant::now();

        self.set_phase(SchedulerPhase::Polling);
        let configs = self.configs.read().await.clone();
        let snapshots = self.orchestrator.poll_all(&configs, None).await;

        self.set_phase(SchedulerPhase::Persisting);
        let mut storage_error = None;
        for snapshot in &snapshots {
            if let Err(e) = self.history.append(snapshot) {
                error!(provider = %snapshot.provider_id, error = %e, "failed to persist snapshot");
                storage_error = Some(e.to_string());
            }
        }

        self.set_phase(SchedulerPhase::Evaluating);
        let preferences = self.preferences.read().await.clone();
        self.evaluate_alerts(&preferences, &configs, &snapshots);

        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;
        self.telemetry
            .record_cycle(storage_error.is_none(), latency_ms, storage_error.as_deref());
        self.set_phase(SchedulerPhase::Idle);

        debug!(snapshots = snapshots.len(), latency_ms, "refresh cycle complete");
        Ok(true)
    }

    /// Fire alerts for threshold crossings, once per crossing.
    ///
    /// A provider that alerted stays latched until a reachable snapshot shows
    /// it back under the threshold; unreachable snapshots leave the latch
    /// untouched.
    fn evaluate_alerts(
        &self,
        preferences: &Preferences,
        configs: &[ProviderConfig],
        snapshots: &[UsageSnapshot],
    ) {
        let Ok(mut alerted) = self.alerted.lock() else {
            return;
        };

        for snapshot in snapshots {
            let Some(config) = configs.iter().find(|c| c.matches_id(&snapshot.provider_id))
            else {
                continue;
            };
            let key = snapshot.provider_id.to_ascii_lowercase();

            if should_alert(preferences, config, snapshot) {
                if alerted.insert(key) {
                    self.notifier.notify(&UsageAlert {
                        provider_id: snapshot.provider_id.clone(),
                        provider_name: snapshot.provider_name.clone(),
                        effective_used_percent: snapshot.effective_used_percent(),
                        threshold: preferences.alert_threshold,
                    });
                }
            } else if snapshot.is_available
                && snapshot.effective_used_percent() < preferences.alert_threshold
            {
                alerted.remove(&key);
            }
        }
    }

    /// Interval until the next tick, re-read from preferences so updates
    /// take effect on a running scheduler.
    async fn tick_interval(&self) -> Duration {
        let minutes = self.preferences.read().await.refresh_interval_minutes.max(1);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Run the periodic refresh loop until the task is cancelled.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_minutes = self.preferences.read().await.refresh_interval_minutes,
            "refresh scheduler started"
        );

        loop {
            if self.preferences.read().await.auto_refresh {
                if let Err(e) = self.refresh_once().await {
                    error!(error = %e, "refresh cycle failed");
                }
            } else {
                debug!("auto refresh disabled, skipping tick");
            }
            tokio::time::sleep(self.tick_interval().await).await;
        }
    }
}
