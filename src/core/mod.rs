//! Core data models and shared infrastructure.

pub mod cli_runner;
pub mod http;
pub mod logging;
pub mod models;
pub mod telemetry;

pub use models::{
    BillingModel, Preferences, ProviderConfig, ResetEvent, ResetType, UsageDetail, UsageSnapshot,
    clamp_percentage, display_name_from_id,
};
pub use telemetry::{RefreshTelemetry, TelemetrySnapshot};
