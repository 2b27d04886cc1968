//! Generic fallback adapter.
//!
//! Serves configured providers with no specific adapter match. Produces a
//! best-effort descriptive snapshot so every configured provider is always
//! represented in poll results.

use async_trait::async_trait;

use crate::core::models::{ProviderConfig, UsageSnapshot, display_name_from_id};

use super::{ProgressSink, ProviderAdapter};

pub struct GenericAdapter;

#[async_trait]
impl ProviderAdapter for GenericAdapter {
    fn provider_id(&self) -> &str {
        "generic"
    }

    async fn poll(
        &self,
        config: &ProviderConfig,
        _progress: Option<&dyn ProgressSink>,
    ) -> Vec<UsageSnapshot> {
        let name = display_name_from_id(&config.provider_id);

        if !config.has_key() {
            return vec![UsageSnapshot::unavailable(
                &config.provider_id,
                name,
                "API key not configured",
            )];
        }

        let mut snapshot = UsageSnapshot::new(&config.provider_id, name);
        snapshot.billing = config.billing;
        snapshot.description = "Connected (generic)".to_string();
        vec![snapshot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_provider_is_unreachable_not_missing() {
        let config = ProviderConfig::new("mystery-vendor");
        let snapshots = GenericAdapter.poll(&config, None).await;
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].is_available);
        assert_eq!(snapshots[0].provider_name, "Mystery Vendor");
    }

    #[tokio::test]
    async fn configured_provider_reports_connected() {
        let mut config = ProviderConfig::new("mystery-vendor");
        config.api_key = "sk-test".to_string();
        let snapshots = GenericAdapter.poll(&config, None).await;
        assert!(snapshots[0].is_available);
        assert!(snapshots[0].description.contains("generic"));
    }
}
