//! Credential and preferences store.
//!
//! Providers and preferences share one JSON document. Provider entries are
//! keyed by lowercase provider id; preferences live under the reserved
//! `app_settings` key. Unknown keys inside `app_settings` are preserved
//! across saves so newer builds can round-trip older files.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::models::{Preferences, ProviderConfig};
use crate::error::{QuotaWatchError, Result};

/// Reserved top-level key holding preferences, never a provider id.
pub const SETTINGS_KEY: &str = "app_settings";

/// JSON-file-backed configuration store.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all provider configurations. A missing file is an empty set.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_providers(&self) -> Result<Vec<ProviderConfig>> {
        let document = self.load_document()?;
        let mut providers = Vec::new();

        for (key, value) in &document {
            if key == SETTINGS_KEY {
                continue;
            }
            match serde_json::from_value::<ProviderConfig>(value.clone()) {
                Ok(mut config) => {
                    // The map key is authoritative for the id.
                    config.provider_id = key.to_ascii_lowercase();
                    providers.push(config);
                }
                Err(e) => {
                    warn!(provider = %key, error = %e, "skipping malformed provider entry");
                }
            }
        }

        Ok(providers)
    }

    /// Replace all provider entries, preserving `app_settings`.
    ///
    /// # Errors
    /// Returns an error if the document cannot be serialized or written.
    pub fn save_providers(&self, providers: &[ProviderConfig]) -> Result<()> {
        let mut document = self.load_document()?;
        document.retain(|key, _| key == SETTINGS_KEY);

        for config in providers {
            let value = serde_json::to_value(config)?;
            document.insert(config.provider_id.to_ascii_lowercase(), value);
        }

        self.write_document(&document)
    }

    /// Load preferences, falling back to defaults for missing fields.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_preferences(&self) -> Result<Preferences> {
        let document = self.load_document()?;
        let Some(settings) = document.get(SETTINGS_KEY) else {
            return Ok(Preferences::default());
        };

        let defaults = Preferences::default();
        let Value::Object(map) = settings else {
            warn!("app_settings is not an object, using defaults");
            return Ok(defaults);
        };

        Ok(Preferences {
            notifications_enabled: map
                .get("notificationsEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.notifications_enabled),
            alert_threshold: map
                .get("alertThreshold")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.alert_threshold),
            refresh_interval_minutes: map
                .get("refreshIntervalMinutes")
                .and_then(Value::as_u64)
                .unwrap_or(defaults.refresh_interval_minutes),
            auto_refresh: map
                .get("autoRefresh")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.auto_refresh),
        })
    }

    /// Save preferences, preserving unknown `app_settings` keys and all
    /// provider entries.
    ///
    /// # Errors
    /// Returns an error if the document cannot be serialized or written.
    pub fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        let mut document = self.load_document()?;

        let mut settings = match document.remove(SETTINGS_KEY) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        settings.insert(
            "notificationsEnabled".to_string(),
            Value::Bool(preferences.notifications_enabled),
        );
        settings.insert(
            "alertThreshold".to_string(),
            serde_json::json!(preferences.alert_threshold),
        );
        settings.insert(
            "refreshIntervalMinutes".to_string(),
            serde_json::json!(preferences.refresh_interval_minutes),
        );
        settings.insert(
            "autoRefresh".to_string(),
            Value::Bool(preferences.auto_refresh),
        );
        document.insert(SETTINGS_KEY.to_string(), Value::Object(settings));

        self.write_document(&document)
    }

    fn load_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "config file absent, starting empty");
            return Ok(Map::new());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| QuotaWatchError::ConfigParse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(QuotaWatchError::ConfigParse {
                path: self.path.display().to_string(),
                message: "top-level JSON value must be an object".to_string(),
            }),
        }
    }

    /// Write via a temp file in the same directory so a crash never leaves a
    /// half-written config behind.
    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        let parent = self.path.parent().map_or_else(|| Path::new("."), |p| p);
        std::fs::create_dir_all(parent)?;

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut file, &Value::Object(document.clone()))?;
        file.write_all(b"\n")?;
        file.persist(&self.path)
            .map_err(|e| QuotaWatchError::Config(format!("persist config: {e}")))?;
        Ok(())
    }
}
