//! Credential-file secret sources.
//!
//! Readers for the JSON credential stores of known third-party coding CLIs.
//! Every reader treats a missing or unreadable file as "nothing found".

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::storage::paths;

use super::{DiscoveredSecret, SecretSource};

const LABEL: &str = "Config File";

fn read_json_object(path: &PathBuf) -> Option<serde_json::Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unparseable credential file");
            None
        }
    }
}

// =============================================================================
// opencode auth.json
// =============================================================================

/// Reads the opencode CLI's `auth.json`, which maps provider ids to
/// credential entries.
pub struct OpencodeAuthSource {
    paths: Vec<PathBuf>,
}

impl OpencodeAuthSource {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Standard opencode locations, checked in order.
    #[must_use]
    pub fn with_default_paths() -> Self {
        let mut candidates = Vec::new();
        if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            candidates.push(PathBuf::from(xdg_data).join("opencode/auth.json"));
        }
        if let Some(home) = paths::home_dir() {
            candidates.push(home.join(".local/share/opencode/auth.json"));
            candidates.push(home.join(".opencode/auth.json"));
        }
        Self::new(candidates)
    }

    /// opencode uses a few historical ids for the same provider.
    fn normalize_id(id: &str) -> String {
        let id = id.to_ascii_lowercase();
        if id == "kimi-for-coding" {
            "kimi".to_string()
        } else {
            id
        }
    }

    fn secret_of(entry: &Value) -> Option<String> {
        match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("key")
                .or_else(|| map.get("apiKey"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

#[async_trait]
impl SecretSource for OpencodeAuthSource {
    fn label(&self) -> &str {
        LABEL
    }

    async fn discover(&self) -> Vec<DiscoveredSecret> {
        let mut found = Vec::new();
        for path in &self.paths {
            let Some(map) = read_json_object(path) else {
                continue;
            };
            for (key, entry) in &map {
                // Reserved preferences key, not a provider.
                if key == "app_settings" {
                    continue;
                }
                if let Some(secret) = Self::secret_of(entry)
                    && !secret.is_empty()
                {
                    found.push(DiscoveredSecret::new(
                        Self::normalize_id(key),
                        secret,
                        LABEL,
                    ));
                }
            }
            if !found.is_empty() {
                break;
            }
        }
        found
    }
}

// =============================================================================
// kilocode secrets.json
// =============================================================================

/// VS Code extension keys carrying API keys, mapped to provider ids.
const KILOCODE_KEY_TABLE: &[(&str, &str)] = &[
    ("anthropicApiKey", "anthropic"),
    ("openAiApiKey", "openai"),
    ("geminiApiKey", "gemini"),
    ("openrouterApiKey", "openrouter"),
    ("mistralApiKey", "mistral"),
    ("kilocodeToken", "kilocode"),
];

/// Reads the Kilo Code extension's secret store, including the JSON-encoded
/// configuration blob nested inside it.
pub struct KilocodeSource {
    path: Option<PathBuf>,
}

impl KilocodeSource {
    #[must_use]
    pub const fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn with_default_path() -> Self {
        Self::new(paths::home_dir().map(|h| h.join(".kilocode/secrets.json")))
    }

    fn collect_keys(object: &serde_json::Map<String, Value>, found: &mut Vec<DiscoveredSecret>) {
        for (key, provider_id) in KILOCODE_KEY_TABLE {
            if let Some(secret) = object.get(*key).and_then(Value::as_str)
                && !secret.is_empty()
                && !found.iter().any(|s| s.provider_id == *provider_id)
            {
                found.push(DiscoveredSecret::new(*provider_id, secret, LABEL));
            }
        }
    }
}

#[async_trait]
impl SecretSource for KilocodeSource {
    fn label(&self) -> &str {
        LABEL
    }

    async fn discover(&self) -> Vec<DiscoveredSecret> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let Some(map) = read_json_object(path) else {
            return Vec::new();
        };
        let Some(Value::Object(store)) = map.get("kilo code.kilo-code") else {
            return Vec::new();
        };

        let mut found = Vec::new();
        Self::collect_keys(store, &mut found);

        // The extension serializes its full profile configuration as a JSON
        // string inside the secret store.
        if let Some(blob) = store
            .get("roo_cline_config_api_config")
            .and_then(Value::as_str)
            && let Ok(Value::Object(config)) = serde_json::from_str::<Value>(blob)
            && let Some(Value::Object(profiles)) = config.get("apiConfigs")
        {
            for profile in profiles.values() {
                if let Value::Object(profile) = profile {
                    Self::collect_keys(profile, &mut found);
                }
            }
        }

        found
    }
}

// =============================================================================
// providers.json
// =============================================================================

/// Reads a plain `providers.json` listing provider ids to seed with empty
/// secrets.
pub struct ProvidersFileSource {
    path: Option<PathBuf>,
}

impl ProvidersFileSource {
    #[must_use]
    pub const fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn with_default_path() -> Self {
        let app_paths = paths::AppPaths::new();
        Self::new(Some(app_paths.config.join("providers.json")))
    }
}

#[async_trait]
impl SecretSource for ProvidersFileSource {
    fn label(&self) -> &str {
        LABEL
    }

    async fn discover(&self) -> Vec<DiscoveredSecret> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let Ok(Value::Array(ids)) = serde_json::from_str::<Value>(&raw) else {
            debug!(path = %path.display(), "providers.json is not a JSON array, skipping");
            return Vec::new();
        };

        ids.iter()
            .filter_map(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(|id| DiscoveredSecret::new(id.to_ascii_lowercase(), "", LABEL))
            .collect()
    }
}
