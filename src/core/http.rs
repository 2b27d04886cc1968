//! HTTP client utilities.
//!
//! Provides a shared HTTP client for all provider adapters.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{QuotaWatchError, Result};

/// Default timeout for full usage fetches.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for lightweight health-style calls against local daemons.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("quotawatch/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| QuotaWatchError::Network(e.to_string()))
}

/// Get or create a default HTTP client.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}
