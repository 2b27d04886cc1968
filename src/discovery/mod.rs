//! Credential discovery.
//!
//! Harvests authentication material from the process environment, known
//! third-party credential files, vendor CLIs, and browser cookie stores, then
//! merges everything into a single configuration set. A source being absent
//! is normal, never an error; a broken source is logged and skipped so one
//! bad file cannot abort the whole pass.

pub mod browser;
pub mod cli_source;
pub mod env_source;
pub mod file_source;

use async_trait::async_trait;
use tracing::debug;

use crate::core::models::ProviderConfig;

pub use browser::{BrowserCookieSource, ChromiumProfile, FirefoxProfile, KeyUnwrap, StaticKeyUnwrap};
pub use cli_source::CliTokenSource;
pub use env_source::EnvSource;
pub use file_source::{KilocodeSource, OpencodeAuthSource, ProvidersFileSource};

/// One credential found by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSecret {
    /// Lowercase provider id.
    pub provider_id: String,
    /// May be empty, meaning "provider known but unconfigured".
    pub secret: String,
    /// Provenance label stored on the resulting configuration.
    pub source_label: String,
}

impl DiscoveredSecret {
    #[must_use]
    pub fn new(
        provider_id: impl Into<String>,
        secret: impl Into<String>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            secret: secret.into(),
            source_label: source_label.into(),
        }
    }
}

/// A place credentials can be read from.
///
/// Implementations are side-effect-free beyond filesystem/process reads and
/// must return an empty list, not an error, when their store is absent.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Provenance label ("Environment Variable", "Config File", ...).
    fn label(&self) -> &str;

    async fn discover(&self) -> Vec<DiscoveredSecret>;
}

/// Provider ids seeded with empty secrets so they stay visible in the
/// configuration set even before any credential is found.
pub const WELL_KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "minimax",
    "xiaomi",
    "kimi",
    "kilocode",
    "claude-code",
    "gemini-cli",
    "antigravity",
];

const WELL_KNOWN_LABEL: &str = "Well-known provider";

/// Merges all secret sources into one configuration set.
pub struct DiscoveryService {
    sources: Vec<Box<dyn SecretSource>>,
}

impl DiscoveryService {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    /// Standard source stack: environment variables, then credential files.
    /// CLI and browser sources need per-platform wiring and are added by the
    /// caller via [`Self::push_source`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Box::new(EnvSource::new()),
            Box::new(OpencodeAuthSource::with_default_paths()),
            Box::new(KilocodeSource::with_default_path()),
            Box::new(ProvidersFileSource::with_default_path()),
        ])
    }

    pub fn push_source(&mut self, source: Box<dyn SecretSource>) {
        self.sources.push(source);
    }

    /// Run every source in order and merge the results into `existing`.
    ///
    /// Merge rules: insert when the id is unknown; overwrite only an empty
    /// key with a non-empty one (updating provenance); never downgrade a
    /// populated key. Idempotent: re-running with unchanged inputs returns an
    /// unchanged set.
    pub async fn discover_configurations(
        &self,
        existing: Vec<ProviderConfig>,
    ) -> Vec<ProviderConfig> {
        let mut configs = existing;

        for id in WELL_KNOWN_PROVIDERS {
            merge_secret(
                &mut configs,
                &DiscoveredSecret::new(*id, "", WELL_KNOWN_LABEL),
            );
        }

        for source in &self.sources {
            let found = source.discover().await;
            debug!(source = source.label(), count = found.len(), "source scanned");
            for secret in found {
                merge_secret(&mut configs, &secret);
            }
        }

        configs
    }
}

fn merge_secret(configs: &mut Vec<ProviderConfig>, found: &DiscoveredSecret) {
    let id = found.provider_id.to_ascii_lowercase();
    if id.is_empty() {
        return;
    }

    if let Some(existing) = configs.iter_mut().find(|c| c.matches_id(&id)) {
        if !existing.has_key() && !found.secret.is_empty() {
            existing.api_key = found.secret.clone();
            existing.auth_source = found.source_label.clone();
        }
    } else {
        let mut config = ProviderConfig::new(id);
        config.api_key = found.secret.clone();
        config.auth_source = found.source_label.clone();
        configs.push(config);
    }
}
