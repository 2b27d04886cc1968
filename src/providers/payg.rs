//! Pay-as-you-go credits adapter.
//!
//! Covers the family of vendors exposing a bearer-authenticated credits or
//! balance endpoint. One instance per vendor, sharing the response-shape
//! sniffing: a `{data: {total_credits, used_credits}}` shape and a
//! `{data: {available_balance}}` shape are both understood.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::models::{
    BillingModel, ProviderConfig, UsageSnapshot, clamp_percentage, display_name_from_id,
};

use super::{ProgressSink, ProviderAdapter};

pub struct CreditsApiAdapter {
    client: Client,
    provider_id: &'static str,
    default_endpoint: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    data: Option<CreditsData>,
}

#[derive(Debug, Deserialize)]
struct CreditsData {
    total_credits: f64,
    used_credits: f64,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    data: Option<BalanceData>,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    available_balance: f64,
}

impl CreditsApiAdapter {
    #[must_use]
    pub const fn new(
        client: Client,
        provider_id: &'static str,
        default_endpoint: &'static str,
    ) -> Self {
        Self {
            client,
            provider_id,
            default_endpoint,
        }
    }

    #[must_use]
    pub const fn openrouter(client: Client) -> Self {
        Self::new(client, "openrouter", "https://openrouter.ai/api/v1/credits")
    }

    #[must_use]
    pub const fn opencode_zen(client: Client) -> Self {
        Self::new(client, "opencode-zen", "https://api.opencode.ai/v1/credits")
    }

    #[must_use]
    pub const fn kilocode(client: Client) -> Self {
        Self::new(client, "kilocode", "https://api.kilocode.ai/v1/credits")
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        config.base_url.as_ref().map_or_else(
            || self.default_endpoint.to_string(),
            |base| {
                let trimmed = base.trim_end_matches('/');
                if trimmed.contains("/credits") || trimmed.contains("balance") {
                    trimmed.to_string()
                } else {
                    format!("{trimmed}/v1/credits")
                }
            },
        )
    }

    fn parse_usage(body: &str) -> Option<(f64, f64)> {
        if let Ok(parsed) = serde_json::from_str::<CreditsResponse>(body)
            && let Some(data) = parsed.data
        {
            return Some((data.used_credits, data.total_credits));
        }
        if let Ok(parsed) = serde_json::from_str::<BalanceResponse>(body)
            && let Some(data) = parsed.data
        {
            return Some((0.0, data.available_balance));
        }
        None
    }

    fn snapshot_from(&self, config: &ProviderConfig, used: f64, total: f64) -> UsageSnapshot {
        let percentage = if total > 0.0 {
            clamp_percentage(used / total * 100.0)
        } else {
            0.0
        };

        let mut snapshot =
            UsageSnapshot::new(&config.provider_id, display_name_from_id(&config.provider_id))
                .with_usage(used, total, percentage);
        snapshot.billing = BillingModel::Usage;
        snapshot.description = format!("{used:.2} / {total:.2} credits");
        snapshot
    }

    fn failure(&self, config: &ProviderConfig, reason: impl Into<String>) -> Vec<UsageSnapshot> {
        vec![UsageSnapshot::unavailable(
            &config.provider_id,
            display_name_from_id(&config.provider_id),
            reason,
        )]
    }
}

#[async_trait]
impl ProviderAdapter for CreditsApiAdapter {
    fn provider_id(&self) -> &str {
        self.provider_id
    }

    async fn poll(
        &self,
        config: &ProviderConfig,
        progress: Option<&dyn ProgressSink>,
    ) -> Vec<UsageSnapshot> {
        if !config.has_key() {
            return self.failure(config, "API key not configured");
        }

        let url = self.endpoint(config);
        if let Some(sink) = progress {
            sink.report(&config.provider_id, "fetching credits");
        }
        debug!(provider = self.provider_id, %url, "fetching credits");

        let response = match self
            .client
            .get(&url)
            .bearer_auth(&config.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(provider = self.provider_id, error = %e, "credits request failed");
                let reason = if e.is_timeout() {
                    "request timed out"
                } else {
                    "connection failed"
                };
                return self.failure(config, reason);
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return self.failure(config, format!("auth rejected ({status})"));
        }
        if !status.is_success() {
            return self.failure(config, format!("API error ({status})"));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return self.failure(config, format!("failed to read response: {e}")),
        };

        match Self::parse_usage(&body) {
            Some((used, total)) => vec![self.snapshot_from(config, used, total)],
            None => self.failure(config, "unrecognized response format"),
        }
    }
}
