//! Core data models.
//!
//! Canonical types shared by discovery, polling, analytics, and scheduling:
//! provider configurations, normalized usage snapshots, and reset events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Billing Model
// =============================================================================

/// How a provider account is billed.
///
/// `Usage` providers report pay-as-you-go cost; `Quota` providers report a
/// fraction of a fixed limit that resets on a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BillingModel {
    #[default]
    #[serde(rename = "usage")]
    Usage,
    #[serde(rename = "coding")]
    Quota,
}

impl BillingModel {
    /// Parse from the strings used in credential files ("usage", "coding",
    /// legacy "api" meaning pay-as-you-go).
    #[must_use]
    pub fn from_config_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "coding" | "quota" => Self::Quota,
            _ => Self::Usage,
        }
    }

    /// Whether usage is tracked as a fraction of a fixed limit.
    #[must_use]
    pub const fn is_quota(self) -> bool {
        matches!(self, Self::Quota)
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one provider account.
///
/// `provider_id` is a stable lowercase string, case-insensitively unique
/// within a configuration set. An empty `api_key` means "known but
/// unconfigured" - the provider stays visible so the user can see it needs
/// setup. Merge operations never downgrade a populated key to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider_id: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub billing: BillingModel,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-provider notification opt-in.
    #[serde(default)]
    pub notify: bool,

    /// Free-form per-model color/label metadata for presentation layers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub model_colors: HashMap<String, String>,

    /// Where the credential was found ("Environment Variable", "Config File",
    /// "Browser Cookie", "Well-known provider", or a manual label).
    #[serde(default)]
    pub auth_source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProviderConfig {
    /// Create a bare config for a provider id.
    #[must_use]
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            ..Self::default()
        }
    }

    /// Case-insensitive id match.
    #[must_use]
    pub fn matches_id(&self, other: &str) -> bool {
        self.provider_id.eq_ignore_ascii_case(other)
    }

    /// Whether a usable credential is present.
    #[must_use]
    pub fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// =============================================================================
// Usage Snapshot
// =============================================================================

/// Per-sub-resource usage line (e.g. one model tier or regional account).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageDetail {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Formatted usage string (e.g. "65%", "$12.40").
    pub used: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_reset: Option<DateTime<Utc>>,
}

/// Normalized result of one poll of one provider.
///
/// `percentage` is always finite and clamped to [0,100]. For quota billing it
/// represents the *remaining* share of the limit; for usage billing it is the
/// consumed share. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub provider_id: String,
    pub provider_name: String,

    #[serde(default)]
    pub account_name: String,

    pub is_available: bool,

    /// Human status/description string ("12.5% used", "auth rejected", ...).
    pub description: String,

    pub used: f64,
    pub available: f64,
    pub percentage: f64,

    pub billing: BillingModel,

    pub fetched_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_reset: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<UsageDetail>,

    /// Fetch latency stamped by the orchestrator; feeds reliability scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    /// Provenance carried through from the provider configuration.
    #[serde(default)]
    pub auth_source: String,
}

impl UsageSnapshot {
    /// Build a snapshot, sanitizing `percentage` to a finite value in [0,100].
    #[must_use]
    pub fn new(provider_id: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_name: provider_name.into(),
            account_name: String::new(),
            is_available: true,
            description: String::new(),
            used: 0.0,
            available: 0.0,
            percentage: 0.0,
            billing: BillingModel::default(),
            fetched_at: Utc::now(),
            next_reset: None,
            details: Vec::new(),
            latency_ms: None,
            auth_source: String::new(),
        }
    }

    /// Standard "unavailable" snapshot for expected failure modes.
    #[must_use]
    pub fn unavailable(
        provider_id: impl Into<String>,
        provider_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut snapshot = Self::new(provider_id, provider_name);
        snapshot.is_available = false;
        snapshot.description = reason.into();
        snapshot
    }

    /// Set the usage triple, clamping `percentage` into [0,100].
    #[must_use]
    pub fn with_usage(mut self, used: f64, available: f64, percentage: f64) -> Self {
        self.used = used;
        self.available = available;
        self.percentage = clamp_percentage(percentage);
        self
    }

    /// Effective consumed percentage regardless of billing model.
    ///
    /// Quota percentages represent the remaining share, so they are inverted;
    /// usage percentages are already consumed share.
    #[must_use]
    pub fn effective_used_percent(&self) -> f64 {
        if self.billing.is_quota() {
            clamp_percentage(100.0 - self.percentage)
        } else {
            clamp_percentage(self.percentage)
        }
    }
}

/// Clamp a raw percentage into [0,100], mapping NaN/infinity to 0.
#[must_use]
pub fn clamp_percentage(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Title-case a provider id for display ("kimi-k2" -> "Kimi K2").
#[must_use]
pub fn display_name_from_id(provider_id: &str) -> String {
    provider_id
        .replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Reset Events
// =============================================================================

/// Classification of a detected usage discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetType {
    /// Quota window rolled over.
    QuotaCycle,
    /// User action (plan change, manual reset).
    Manual,
    Unknown,
}

/// Detected discontinuity in a provider's consumption curve. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResetEvent {
    pub provider_id: String,
    pub previous_usage: f64,
    pub new_usage: f64,
    pub reset_type: ResetType,
    pub detected_at: DateTime<Utc>,
}

// =============================================================================
// Preferences
// =============================================================================

/// User preferences consumed by the scheduler and alert rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Global notification switch; when off, no alert ever fires.
    pub notifications_enabled: bool,

    /// Effective-used percentage at which an alert fires.
    pub alert_threshold: f64,

    pub refresh_interval_minutes: u64,

    pub auto_refresh: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            alert_threshold: 90.0,
            refresh_interval_minutes: 5,
            auto_refresh: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_handles_pathological_input() {
        assert!((clamp_percentage(150.0) - 100.0).abs() < f64::EPSILON);
        assert!(clamp_percentage(-3.0).abs() < f64::EPSILON);
        assert!(clamp_percentage(f64::NAN).abs() < f64::EPSILON);
        assert!(clamp_percentage(f64::INFINITY).abs() < f64::EPSILON);
        assert!((clamp_percentage(42.5) - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn effective_used_inverts_for_quota() {
        let mut snapshot =
            UsageSnapshot::new("zai", "z.ai").with_usage(95.0, 100.0, 5.0);
        snapshot.billing = BillingModel::Quota;
        assert!((snapshot.effective_used_percent() - 95.0).abs() < 1e-9);

        snapshot.billing = BillingModel::Usage;
        assert!((snapshot.effective_used_percent() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn with_usage_clamps_percentage() {
        let snapshot = UsageSnapshot::new("openai", "OpenAI").with_usage(10.0, 0.0, f64::NAN);
        assert!(snapshot.percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn billing_model_parses_config_strings() {
        assert_eq!(BillingModel::from_config_str("coding"), BillingModel::Quota);
        assert_eq!(BillingModel::from_config_str("usage"), BillingModel::Usage);
        assert_eq!(BillingModel::from_config_str("api"), BillingModel::Usage);
        assert_eq!(BillingModel::from_config_str("QUOTA"), BillingModel::Quota);
    }

    #[test]
    fn display_name_title_cases() {
        assert_eq!(display_name_from_id("kimi-k2"), "Kimi K2");
        assert_eq!(display_name_from_id("openrouter"), "Openrouter");
        assert_eq!(display_name_from_id("claude_code"), "Claude Code");
    }

    #[test]
    fn config_matching_is_case_insensitive() {
        let config = ProviderConfig::new("openai");
        assert!(config.matches_id("OpenAI"));
        assert!(!config.matches_id("anthropic"));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = UsageSnapshot::new("kimi", "Kimi");
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("providerId"));
        assert!(json.contains("isAvailable"));
    }
}
