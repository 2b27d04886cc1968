//! Provider adapters.
//!
//! Every vendor integration implements [`ProviderAdapter`]; the orchestrator
//! depends only on this contract. Adapters never error for ordinary failure
//! modes - auth rejected, network unreachable, or malformed responses become
//! an unreachable snapshot with a descriptive status string.

pub mod companion;
pub mod generic;
pub mod payg;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::models::{ProviderConfig, UsageSnapshot};

pub use companion::CompanionAdapter;
pub use generic::GenericAdapter;
pub use payg::CreditsApiAdapter;

/// Receives human-readable progress updates during a poll.
pub trait ProgressSink: Send + Sync {
    fn report(&self, provider_id: &str, message: &str);
}

/// The uniform contract every vendor integration implements.
///
/// `poll` may return more than one snapshot when a provider reports several
/// logical sub-accounts (e.g. regional variants). It must always return at
/// least one snapshot; failure modes are represented in the snapshot itself.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable lowercase provider id this adapter serves.
    fn provider_id(&self) -> &str;

    /// Poll current usage for the configured account(s).
    async fn poll(
        &self,
        config: &ProviderConfig,
        progress: Option<&dyn ProgressSink>,
    ) -> Vec<UsageSnapshot>;
}

/// Registry of adapters keyed by provider id, with an explicit fallback.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    fallback: Arc<dyn ProviderAdapter>,
}

impl AdapterRegistry {
    /// Registry with the built-in adapter set.
    #[must_use]
    pub fn with_defaults(client: Client) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CreditsApiAdapter::openrouter(client.clone())));
        registry.register(Arc::new(CreditsApiAdapter::opencode_zen(client.clone())));
        registry.register(Arc::new(CreditsApiAdapter::kilocode(client.clone())));
        registry.register(Arc::new(CompanionAdapter::new(client)));
        registry
    }

    /// Registry containing only the generic fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
            fallback: Arc::new(GenericAdapter),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.push(adapter);
    }

    /// First adapter whose id equals the config's id (case-insensitive),
    /// falling back to the generic adapter.
    #[must_use]
    pub fn select(&self, provider_id: &str) -> Arc<dyn ProviderAdapter> {
        self.adapters
            .iter()
            .find(|a| a.provider_id().eq_ignore_ascii_case(provider_id))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Number of registered adapters, excluding the fallback.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
