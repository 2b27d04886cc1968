//! Persistence: provider credentials, preferences, and snapshot history.

pub mod config;
pub mod history;
pub mod paths;

use chrono::{DateTime, Utc};

use crate::Result;
use crate::core::models::UsageSnapshot;

pub use config::ConfigStore;
pub use history::{DEFAULT_RETENTION_DAYS, HistoryStore};
pub use paths::AppPaths;

/// Append-only snapshot log consumed by the scheduler and analytics.
///
/// Implementations must tolerate concurrent use from multiple tasks.
pub trait SnapshotHistory: Send + Sync {
    /// Persist one snapshot.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    fn append(&self, snapshot: &UsageSnapshot) -> Result<()>;

    /// Snapshots for a provider since a point in time, ascending by fetch
    /// time.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    fn history_since(
        &self,
        provider_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageSnapshot>>;
}
