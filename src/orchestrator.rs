//! Usage orchestrator.
//!
//! Fans polling out across all configured providers with per-provider
//! timeout and failure isolation, and normalizes the results. A panicking or
//! timed-out adapter yields an unreachable snapshot for its provider, never a
//! dropped entry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, error};

use crate::core::models::{ProviderConfig, UsageSnapshot, display_name_from_id};
use crate::providers::AdapterRegistry;

/// Per-provider poll timeout.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(12);

/// Always-present system provider ids polled even without an explicit config.
pub const SYSTEM_PROVIDERS: &[&str] = &["companion"];

/// Provider ids excluded from external-facing views by convention.
/// Internal polling still covers them.
pub const HIDDEN_FROM_EXTERNAL_VIEWS: &[&str] = &["companion"];

pub struct UsageOrchestrator {
    registry: Arc<AdapterRegistry>,
    poll_timeout: Duration,
}

impl UsageOrchestrator {
    #[must_use]
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            poll_timeout: POLL_TIMEOUT,
        }
    }

    /// Override the per-provider timeout (tests use short values).
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Poll every configured provider concurrently.
    ///
    /// `include` optionally restricts polling to an explicit set of provider
    /// ids (case-insensitive). System providers are appended when absent from
    /// the configuration set. Given identical adapter outputs the snapshot
    /// set's membership and field values do not depend on polling order.
    pub async fn poll_all(
        &self,
        configs: &[ProviderConfig],
        include: Option<&[String]>,
    ) -> Vec<UsageSnapshot> {
        let mut selected: Vec<ProviderConfig> = configs
            .iter()
            .filter(|c| {
                include.is_none_or(|ids| ids.iter().any(|id| c.matches_id(id)))
            })
            .cloned()
            .collect();

        for system_id in SYSTEM_PROVIDERS {
            let wanted = include.is_none_or(|ids| ids.iter().any(|id| id.eq_ignore_ascii_case(system_id)));
            if wanted && !selected.iter().any(|c| c.matches_id(system_id)) {
                let mut config = ProviderConfig::new(*system_id);
                config.auth_source = "System".to_string();
                selected.push(config);
            }
        }

        let mut tasks = Vec::with_capacity(selected.len());
        for config in selected {
            let registry = Arc::clone(&self.registry);
            let timeout = self.poll_timeout;
            tasks.push((
                config.clone(),
                tokio::spawn(async move {
                    let adapter = registry.select(&config.provider_id);
                    debug!(provider = %config.provider_id, adapter = adapter.provider_id(), "polling");
                    let started = Instant::now();
                    let result =
                        tokio::time::timeout(timeout, adapter.poll(&config, None)).await;
                    #[allow(clippy::cast_possible_truncation)]
                    let latency_ms = started.elapsed().as_millis() as u64;
                    (result, latency_ms)
                }),
            ));
        }

        let outcomes = join_all(
            tasks
                .into_iter()
                .map(|(config, task)| async move { (config, task.await) }),
        )
        .await;

        let mut results = Vec::new();
        for (config, outcome) in outcomes {
            match outcome {
                Ok((Ok(mut snapshots), latency_ms)) => {
                    if snapshots.is_empty() {
                        snapshots.push(Self::unreachable(&config, "adapter returned no data"));
                    }
                    for snapshot in &mut snapshots {
                        snapshot.latency_ms = Some(latency_ms);
                        if snapshot.auth_source.is_empty() {
                            snapshot.auth_source = config.auth_source.clone();
                        }
                    }
                    results.extend(snapshots);
                }
                Ok((Err(_), _)) => {
                    debug!(provider = %config.provider_id, "poll timed out");
                    results.push(Self::unreachable(&config, "poll timed out"));
                }
                Err(join_err) => {
                    error!(provider = %config.provider_id, error = %join_err, "adapter task failed");
                    results.push(Self::unreachable(&config, "adapter failed unexpectedly"));
                }
            }
        }

        results
    }

    /// Drop snapshots for providers hidden from external-facing views.
    #[must_use]
    pub fn visible_snapshots(snapshots: &[UsageSnapshot]) -> Vec<UsageSnapshot> {
        snapshots
            .iter()
            .filter(|s| {
                !HIDDEN_FROM_EXTERNAL_VIEWS
                    .iter()
                    .any(|id| s.provider_id.eq_ignore_ascii_case(id))
            })
            .cloned()
            .collect()
    }

    fn unreachable(config: &ProviderConfig, reason: &str) -> UsageSnapshot {
        let mut snapshot = UsageSnapshot::unavailable(
            &config.provider_id,
            display_name_from_id(&config.provider_id),
            reason,
        );
        snapshot.billing = config.billing;
        snapshot.auth_source = config.auth_source.clone();
        snapshot
    }
}
