//! Snapshot history storage layer.
//!
//! SQLite-backed append-only log of usage snapshots, one row per poll per
//! provider. Analytics reads slices of this log; the scheduler appends to it
//! after every refresh cycle.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use crate::core::models::{BillingModel, UsageDetail, UsageSnapshot};
use crate::error::{QuotaWatchError, Result};
use crate::storage::SnapshotHistory;

/// Default retention for detailed snapshots (days).
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS usage_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider_id TEXT NOT NULL,
    provider_name TEXT NOT NULL,
    account_name TEXT NOT NULL DEFAULT '',
    is_available INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    used REAL NOT NULL,
    available REAL NOT NULL,
    percentage REAL NOT NULL,
    billing TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    next_reset TEXT,
    details_json TEXT,
    latency_ms INTEGER,
    auth_source TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_snapshots_provider_time
    ON usage_snapshots (provider_id, fetched_at);";

/// History database access layer.
///
/// The connection is mutex-wrapped so one store can be shared across the
/// scheduler and on-demand analytics queries.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Create or open a history database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or schema setup fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| QuotaWatchError::History(format!("open history db: {e}")))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory history database (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or schema
    /// setup fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| QuotaWatchError::History(format!("open in-memory db: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| QuotaWatchError::History(format!("init schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QuotaWatchError::History("history lock poisoned".to_string()))
    }

    /// Record a usage snapshot.
    ///
    /// # Errors
    /// Returns an error if the INSERT statement cannot be prepared or
    /// executed.
    pub fn record_snapshot(&self, snapshot: &UsageSnapshot) -> Result<i64> {
        let details_json = if snapshot.details.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&snapshot.details)?)
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "INSERT INTO usage_snapshots ( \
                    provider_id, provider_name, account_name, is_available, \
                    description, used, available, percentage, billing, \
                    fetched_at, next_reset, details_json, latency_ms, auth_source \
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )
            .map_err(|e| QuotaWatchError::History(format!("prepare insert: {e}")))?;

        stmt.execute(params![
            snapshot.provider_id,
            snapshot.provider_name,
            snapshot.account_name,
            i32::from(snapshot.is_available),
            snapshot.description,
            snapshot.used,
            snapshot.available,
            snapshot.percentage,
            if snapshot.billing.is_quota() { "coding" } else { "usage" },
            snapshot.fetched_at.to_rfc3339(),
            snapshot.next_reset.as_ref().map(DateTime::to_rfc3339),
            details_json,
            snapshot.latency_ms.and_then(|v| i64::try_from(v).ok()),
            snapshot.auth_source,
        ])
        .map_err(|e| QuotaWatchError::History(format!("insert snapshot: {e}")))?;

        Ok(conn.last_insert_rowid())
    }

    /// Snapshots for a provider since a point in time, ascending.
    ///
    /// # Errors
    /// Returns an error if the SELECT query cannot be prepared or executed.
    pub fn get_history_since(
        &self,
        provider_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT \
                    provider_id, provider_name, account_name, is_available, \
                    description, used, available, percentage, billing, \
                    fetched_at, next_reset, details_json, latency_ms, auth_source \
                FROM usage_snapshots \
                WHERE provider_id = ?1 AND fetched_at >= ?2 \
                ORDER BY fetched_at ASC",
            )
            .map_err(|e| QuotaWatchError::History(format!("prepare select: {e}")))?;

        let rows = stmt
            .query_map(params![provider_id, since.to_rfc3339()], map_row)
            .map_err(|e| QuotaWatchError::History(format!("query history: {e}")))?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row.map_err(|e| QuotaWatchError::History(format!("map row: {e}")))?);
        }
        Ok(snapshots)
    }

    /// The most recent snapshot per provider id.
    ///
    /// # Errors
    /// Returns an error if the SELECT query cannot be prepared or executed.
    pub fn get_latest_all(&self) -> Result<Vec<UsageSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT \
                    provider_id, provider_name, account_name, is_available, \
                    description, used, available, percentage, billing, \
                    fetched_at, next_reset, details_json, latency_ms, auth_source \
                FROM usage_snapshots \
                ORDER BY fetched_at DESC",
            )
            .map_err(|e| QuotaWatchError::History(format!("prepare select: {e}")))?;

        let rows = stmt
            .query_map([], map_row)
            .map_err(|e| QuotaWatchError::History(format!("query latest: {e}")))?;

        let mut latest: Vec<UsageSnapshot> = Vec::new();
        for row in rows {
            let snapshot = row.map_err(|e| QuotaWatchError::History(format!("map row: {e}")))?;
            if !latest.iter().any(|s| s.provider_id == snapshot.provider_id) {
                latest.push(snapshot);
            }
        }
        Ok(latest)
    }

    /// Delete snapshots older than the retention window.
    ///
    /// # Errors
    /// Returns an error if the retention is non-positive or the DELETE fails.
    pub fn cleanup(&self, retention_days: i64) -> Result<usize> {
        if retention_days <= 0 {
            return Err(QuotaWatchError::Config(
                "Retention days must be greater than 0".to_string(),
            ));
        }

        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM usage_snapshots WHERE fetched_at < ?1",
            [cutoff.to_rfc3339()],
        )
        .map_err(|e| QuotaWatchError::History(format!("cleanup: {e}")))
    }

    /// Cleanup with the default retention window.
    ///
    /// # Errors
    /// Returns an error if the cleanup query fails.
    pub fn cleanup_default(&self) -> Result<usize> {
        self.cleanup(DEFAULT_RETENTION_DAYS)
    }
}

impl SnapshotHistory for HistoryStore {
    fn append(&self, snapshot: &UsageSnapshot) -> Result<()> {
        self.record_snapshot(snapshot).map(|_| ())
    }

    fn history_since(
        &self,
        provider_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageSnapshot>> {
        self.get_history_since(provider_id, since)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<UsageSnapshot> {
    let billing: String = row.get(8)?;
    let fetched_at: String = row.get(9)?;
    let next_reset: Option<String> = row.get(10)?;
    let details_json: Option<String> = row.get(11)?;
    let latency_ms: Option<i64> = row.get(12)?;

    let details: Vec<UsageDetail> = details_json
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();

    Ok(UsageSnapshot {
        provider_id: row.get(0)?,
        provider_name: row.get(1)?,
        account_name: row.get(2)?,
        is_available: row.get::<_, i64>(3)? != 0,
        description: row.get(4)?,
        used: row.get(5)?,
        available: row.get(6)?,
        percentage: row.get(7)?,
        billing: BillingModel::from_config_str(&billing),
        fetched_at: parse_timestamp(&fetched_at)?,
        next_reset: next_reset.and_then(|v| {
            DateTime::parse_from_rfc3339(&v)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
        details,
        latency_ms: latency_ms.and_then(|v| u64::try_from(v).ok()),
        auth_source: row.get(13)?,
    })
}

fn parse_timestamp(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_temp_store() -> HistoryStore {
        HistoryStore::open_in_memory().expect("open store")
    }

    fn make_snapshot(at: DateTime<Utc>, used: f64) -> UsageSnapshot {
        let mut snapshot =
            UsageSnapshot::new("openrouter", "OpenRouter").with_usage(used, 100.0, used);
        snapshot.fetched_at = at;
        snapshot.latency_ms = Some(120);
        snapshot
    }

    #[test]
    fn record_and_query_round_trip() {
        let store = open_temp_store();
        let now = Utc::now();

        let id = store
            .record_snapshot(&make_snapshot(now, 42.0))
            .expect("record snapshot");
        assert!(id > 0);

        let results = store
            .get_history_since("openrouter", now - Duration::hours(1))
            .expect("query history");
        assert_eq!(results.len(), 1);
        assert!((results[0].used - 42.0).abs() < f64::EPSILON);
        assert_eq!(results[0].latency_ms, Some(120));
        assert_eq!(results[0].billing, BillingModel::Usage);
    }

    #[test]
    fn history_is_ascending_and_filtered_by_provider() {
        let store = open_temp_store();
        let now = Utc::now();

        store
            .record_snapshot(&make_snapshot(now, 30.0))
            .expect("record newest");
        store
            .record_snapshot(&make_snapshot(now - Duration::hours(2), 10.0))
            .expect("record oldest");

        let mut other = make_snapshot(now, 99.0);
        other.provider_id = "kimi".to_string();
        store.record_snapshot(&other).expect("record other");

        let results = store
            .get_history_since("openrouter", now - Duration::days(1))
            .expect("query history");
        assert_eq!(results.len(), 2);
        assert!(results[0].fetched_at < results[1].fetched_at);
        assert!((results[0].used - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn since_bound_excludes_older_rows() {
        let store = open_temp_store();
        let now = Utc::now();

        store
            .record_snapshot(&make_snapshot(now - Duration::days(10), 5.0))
            .expect("record old");
        store
            .record_snapshot(&make_snapshot(now, 15.0))
            .expect("record new");

        let results = store
            .get_history_since("openrouter", now - Duration::days(1))
            .expect("query history");
        assert_eq!(results.len(), 1);
        assert!((results[0].used - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn latest_per_provider() {
        let store = open_temp_store();
        let now = Utc::now();

        store
            .record_snapshot(&make_snapshot(now - Duration::minutes(10), 10.0))
            .expect("record older");
        store
            .record_snapshot(&make_snapshot(now, 20.0))
            .expect("record newer");

        let mut kimi = make_snapshot(now, 50.0);
        kimi.provider_id = "kimi".to_string();
        store.record_snapshot(&kimi).expect("record kimi");

        let latest = store.get_latest_all().expect("latest all");
        assert_eq!(latest.len(), 2);
        let openrouter = latest
            .iter()
            .find(|s| s.provider_id == "openrouter")
            .expect("openrouter present");
        assert!((openrouter.used - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cleanup_removes_only_expired_rows() {
        let store = open_temp_store();
        let now = Utc::now();

        store
            .record_snapshot(&make_snapshot(now - Duration::days(120), 5.0))
            .expect("record expired");
        store
            .record_snapshot(&make_snapshot(now, 15.0))
            .expect("record fresh");

        let deleted = store.cleanup_default().expect("cleanup");
        assert_eq!(deleted, 1);

        let remaining = store
            .get_history_since("openrouter", now - Duration::days(365))
            .expect("query");
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn cleanup_rejects_non_positive_retention() {
        let store = open_temp_store();
        assert!(store.cleanup(0).is_err());
    }

    #[test]
    fn details_round_trip() {
        let store = open_temp_store();
        let mut snapshot = make_snapshot(Utc::now(), 10.0);
        snapshot.details.push(UsageDetail {
            name: "fast".to_string(),
            group: None,
            used: "65%".to_string(),
            next_reset: None,
        });

        store.record_snapshot(&snapshot).expect("record");
        let results = store
            .get_history_since("openrouter", Utc::now() - Duration::hours(1))
            .expect("query");
        assert_eq!(results[0].details.len(), 1);
        assert_eq!(results[0].details[0].used, "65%");
    }
}
