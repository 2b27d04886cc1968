//! Companion-daemon adapter.
//!
//! Polls a locally-running companion app that exposes per-model quota over a
//! loopback status endpoint. Endpoint discovery (port probing) is expensive,
//! so the last successful result is cached with a TTL; when the live source
//! is unreachable the adapter degrades to "status unknown, last refreshed at
//! T" instead of blocking or failing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::http;
use crate::core::models::{
    BillingModel, ProviderConfig, UsageDetail, UsageSnapshot, clamp_percentage,
};

use super::{ProgressSink, ProviderAdapter};

/// Loopback ports the companion daemon is known to bind.
const CANDIDATE_PORTS: &[u16] = &[43110, 43111, 43112];

/// How long a cached status stays trustworthy.
const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedStatus {
    endpoint: String,
    snapshot: UsageSnapshot,
    refreshed_at: DateTime<Utc>,
}

pub struct CompanionAdapter {
    client: Client,
    // Private last-known-good state; TTL check-then-use happens under this lock.
    cache: Mutex<Option<CachedStatus>>,
}

#[derive(Debug, Deserialize)]
struct CompanionStatus {
    #[serde(default)]
    account: String,
    #[serde(default)]
    models: Vec<CompanionModel>,
}

#[derive(Debug, Deserialize)]
struct CompanionModel {
    name: String,
    #[serde(default)]
    group: Option<String>,
    remaining_fraction: f64,
    #[serde(default)]
    reset_time: Option<DateTime<Utc>>,
}

impl CompanionAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: Mutex::new(None),
        }
    }

    async fn fetch_status(&self, endpoint: &str) -> Option<UsageSnapshot> {
        // Loopback health-style call: the short timeout keeps port probing
        // from eating the poll budget.
        let response = self
            .client
            .get(endpoint)
            .timeout(http::HEALTH_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let status: CompanionStatus = response.json().await.ok()?;
        Some(Self::snapshot_from(&status))
    }

    fn snapshot_from(status: &CompanionStatus) -> UsageSnapshot {
        let mut min_remaining: f64 = 100.0;
        let mut details = Vec::with_capacity(status.models.len());

        for model in &status.models {
            let remaining_pct = clamp_percentage(model.remaining_fraction * 100.0);
            min_remaining = min_remaining.min(remaining_pct);
            details.push(UsageDetail {
                name: model.name.clone(),
                group: model.group.clone(),
                used: format!("{:.0}%", 100.0 - remaining_pct),
                next_reset: model.reset_time,
            });
        }

        let earliest_reset = details.iter().filter_map(|d| d.next_reset).min();

        let mut snapshot = UsageSnapshot::new("companion", "Companion").with_usage(
            100.0 - min_remaining,
            100.0,
            min_remaining,
        );
        snapshot.billing = BillingModel::Quota;
        snapshot.account_name = status.account.clone();
        snapshot.description = format!("{:.1}% used", 100.0 - min_remaining);
        snapshot.next_reset = earliest_reset;
        snapshot.details = details;
        snapshot
    }

    /// Probe candidate loopback ports for a responding daemon.
    async fn discover_endpoint(&self, config: &ProviderConfig) -> Option<String> {
        if let Some(base) = &config.base_url {
            return Some(format!("{}/status", base.trim_end_matches('/')));
        }
        for port in CANDIDATE_PORTS {
            let endpoint = format!("http://127.0.0.1:{port}/status");
            debug!(%endpoint, "probing companion daemon");
            if self.fetch_status(&endpoint).await.is_some() {
                return Some(endpoint);
            }
        }
        None
    }

    fn stale_snapshot(cached: &CachedStatus) -> UsageSnapshot {
        let mut snapshot = cached.snapshot.clone();
        // The daemon did not answer this poll, so the snapshot counts as a
        // failed observation even though the cached numbers are shown.
        snapshot.is_available = false;
        snapshot.description = format!(
            "status unknown, last refreshed at {}",
            cached.refreshed_at.format("%Y-%m-%d %H:%M UTC")
        );
        snapshot
    }
}

#[async_trait]
impl ProviderAdapter for CompanionAdapter {
    fn provider_id(&self) -> &str {
        "companion"
    }

    async fn poll(
        &self,
        config: &ProviderConfig,
        progress: Option<&dyn ProgressSink>,
    ) -> Vec<UsageSnapshot> {
        if let Some(sink) = progress {
            sink.report("companion", "checking companion daemon");
        }

        let mut cache = self.cache.lock().await;

        // Re-use the known endpoint first; fall back to discovery.
        let endpoint = match cache.as_ref() {
            Some(cached) => Some(cached.endpoint.clone()),
            None => self.discover_endpoint(config).await,
        };

        if let Some(endpoint) = endpoint {
            if let Some(snapshot) = self.fetch_status(&endpoint).await {
                *cache = Some(CachedStatus {
                    endpoint,
                    snapshot: snapshot.clone(),
                    refreshed_at: Utc::now(),
                });
                return vec![snapshot];
            }
            warn!(%endpoint, "companion daemon unreachable");
        }

        // Live source unreachable: serve cached data while it is fresh.
        if let Some(cached) = cache.as_ref() {
            let age = Utc::now().signed_duration_since(cached.refreshed_at);
            if age.to_std().is_ok_and(|a| a <= CACHE_TTL) {
                return vec![Self::stale_snapshot(cached)];
            }
            // Stale endpoint; force rediscovery next poll.
            let stale = Self::stale_snapshot(cached);
            *cache = None;
            return vec![stale];
        }

        vec![UsageSnapshot::unavailable(
            "companion",
            "Companion",
            "companion daemon not running",
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn status_body(remaining: f64) -> serde_json::Value {
        serde_json::json!({
            "account": "dev@example.com",
            "models": [
                {"name": "fast", "remaining_fraction": remaining},
                {"name": "smart", "group": "premium", "remaining_fraction": 0.9}
            ]
        })
    }

    fn config_for(server: &MockServer) -> ProviderConfig {
        let mut config = ProviderConfig::new("companion");
        config.base_url = Some(server.uri());
        config
    }

    #[tokio::test]
    async fn reports_minimum_remaining_across_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(0.25)))
            .mount(&server)
            .await;

        let adapter = CompanionAdapter::new(http::default_client().unwrap());
        let snapshots = adapter.poll(&config_for(&server), None).await;

        let snap = &snapshots[0];
        assert!(snap.is_available);
        assert!((snap.percentage - 25.0).abs() < 1e-9);
        assert_eq!(snap.billing, BillingModel::Quota);
        assert_eq!(snap.details.len(), 2);
        assert_eq!(snap.account_name, "dev@example.com");
    }

    #[tokio::test]
    async fn serves_cached_result_when_daemon_goes_away() {
        // A non-pooled server: dropping it actually shuts the listener down,
        // unlike `MockServer::start()`, whose pooled server keeps answering.
        let server = MockServer::builder().start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(0.5)))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = CompanionAdapter::new(http::default_client().unwrap());
        let config = config_for(&server);

        let first = adapter.poll(&config, None).await;
        assert!(first[0].is_available);

        // Daemon disappears between polls.
        drop(server);

        let second = adapter.poll(&config, None).await;
        assert!(second[0].description.contains("status unknown"));
        assert!((second[0].percentage - 50.0).abs() < 1e-9);
        // A poll the daemon did not answer is not a successful observation.
        assert!(!second[0].is_available);
    }

    #[tokio::test]
    async fn slow_daemon_is_cut_off_by_the_health_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(status_body(0.5))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let adapter = CompanionAdapter::new(http::default_client().unwrap());
        let started = std::time::Instant::now();
        let snapshots = adapter.poll(&config_for(&server), None).await;

        // The 5s response never lands: the 3s health timeout gives up first.
        assert!(!snapshots[0].is_available);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn no_daemon_and_no_cache_is_unreachable() {
        let adapter = CompanionAdapter::new(http::default_client().unwrap());
        let mut config = ProviderConfig::new("companion");
        // Point at a closed port so discovery fails fast.
        config.base_url = Some("http://127.0.0.1:1".to_string());

        let snapshots = adapter.poll(&config, None).await;
        assert!(!snapshots[0].is_available);
        assert!(snapshots[0].description.contains("not running"));
    }
}
