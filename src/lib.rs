//! quotawatch - usage and quota telemetry for AI service accounts.
//!
//! Polls an arbitrary set of provider adapters, normalizes the results into
//! canonical usage snapshots, and derives burn-rate forecasts, reliability
//! scores, and anomaly flags from the snapshot history. Credentials are
//! discovered from environment variables, JSON credential stores, vendor
//! CLIs, and browser cookie jars.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]

pub mod analytics;
pub mod core;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod scheduler;
pub mod storage;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{QuotaWatchError, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
