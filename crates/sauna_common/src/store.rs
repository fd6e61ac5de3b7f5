//! Sample Store - SQLite-backed measurement log
//!
//! One row per timestamp. Temperature and humidity may arrive as separate
//! partial writes for the same instant; they are merged on the primary key
//! so that arrival order does not matter.
//!
//! Every method takes the connection lock for exactly one statement. Nothing
//! spans calls, so the acquisition writer and the evaluation loop only ever
//! contend for a single query.

use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::StorageError;
use crate::sample::{format_timestamp, local_now, Order, Sample, TIMESTAMP_FORMAT};

/// Default retention horizon
pub const DEFAULT_RETENTION_DAYS: u32 = 10;

/// Data older than this is considered stale
pub const DEFAULT_FRESHNESS_HOURS: i64 = 2;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS measurements (
        timestamp TEXT PRIMARY KEY,
        temperature REAL,
        humidity REAL
    );
";

// Coalesce preferring the new value: a partial write never clears a field.
const UPSERT: &str = "
    INSERT INTO measurements (timestamp, temperature, humidity)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(timestamp) DO UPDATE SET
        temperature = COALESCE(excluded.temperature, measurements.temperature),
        humidity = COALESCE(excluded.humidity, measurements.humidity)
";

/// Timestamp-keyed measurement store
pub struct SampleStore {
    conn: Mutex<Connection>,
}

impl SampleStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets saunactl read while the daemon writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        debug!("Sample store opened at {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Store backed by a private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Upsert a (possibly partial) measurement.
    ///
    /// Fields present in this write replace stored values; absent fields keep
    /// whatever is already stored. A write with neither field is a no-op.
    pub fn store(
        &self,
        timestamp: NaiveDateTime,
        temperature: Option<f64>,
        humidity: Option<f64>,
    ) -> Result<(), StorageError> {
        if temperature.is_none() && humidity.is_none() {
            return Ok(());
        }

        let conn = self.lock()?;
        conn.execute(UPSERT, params![format_timestamp(timestamp), temperature, humidity])?;
        Ok(())
    }

    pub fn store_sample(&self, sample: &Sample) -> Result<(), StorageError> {
        self.store(sample.timestamp, sample.temperature, sample.humidity)
    }

    /// Samples newer than `now - since`
    pub fn query(&self, since: Duration, order: Order) -> Result<Vec<Sample>, StorageError> {
        self.query_at(local_now(), since, order)
    }

    pub fn query_at(
        &self,
        now: NaiveDateTime,
        since: Duration,
        order: Order,
    ) -> Result<Vec<Sample>, StorageError> {
        // A horizon reaching past the calendar's start selects everything
        let threshold = now.checked_sub_signed(since).map(format_timestamp).unwrap_or_default();
        let sql = match order {
            Order::Chronological => {
                "SELECT timestamp, temperature, humidity FROM measurements
                 WHERE timestamp > ?1 ORDER BY timestamp ASC"
            }
            Order::MostRecentFirst => {
                "SELECT timestamp, temperature, humidity FROM measurements
                 WHERE timestamp > ?1 ORDER BY timestamp DESC"
            }
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([threshold], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (ts, temperature, humidity) = row?;
            samples.push(Sample {
                timestamp: parse_stored(&ts)?,
                temperature,
                humidity,
            });
        }

        Ok(samples)
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Result<Option<Sample>, StorageError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT timestamp, temperature, humidity FROM measurements
                 ORDER BY timestamp DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        match row {
            Some((ts, temperature, humidity)) => Ok(Some(Sample {
                timestamp: parse_stored(&ts)?,
                temperature,
                humidity,
            })),
            None => Ok(None),
        }
    }

    /// True iff the latest sample is within `max_age` of now. An empty store
    /// is not fresh.
    pub fn is_fresh(&self, max_age: Duration) -> Result<bool, StorageError> {
        self.is_fresh_at(local_now(), max_age)
    }

    pub fn is_fresh_at(&self, now: NaiveDateTime, max_age: Duration) -> Result<bool, StorageError> {
        let latest: Option<String> = {
            let conn = self.lock()?;
            conn.query_row("SELECT MAX(timestamp) FROM measurements", [], |row| row.get(0))?
        };

        match latest {
            Some(ts) => Ok(now.signed_duration_since(parse_stored(&ts)?) <= max_age),
            None => Ok(false),
        }
    }

    /// Delete samples older than `retention_days`. Returns the number removed.
    pub fn prune(&self, retention_days: u32) -> Result<usize, StorageError> {
        self.prune_at(local_now(), retention_days)
    }

    pub fn prune_at(&self, now: NaiveDateTime, retention_days: u32) -> Result<usize, StorageError> {
        let cutoff = Duration::try_days(i64::from(retention_days)).and_then(|d| now.checked_sub_signed(d));
        let Some(cutoff) = cutoff else {
            // Nothing can be older than the earliest representable instant
            debug!("Retention of {} days reaches past the calendar, nothing to prune", retention_days);
            return Ok(0);
        };

        let threshold = format_timestamp(cutoff);
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM measurements WHERE timestamp < ?1", [threshold])?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM measurements", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn parse_stored(text: &str) -> Result<NaiveDateTime, StorageError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|_| StorageError::CorruptTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_store_and_query_order() {
        let store = SampleStore::open_in_memory().unwrap();
        store.store(at(2, 11, 0), Some(40.0), Some(12.0)).unwrap();
        store.store(at(2, 11, 30), Some(50.0), Some(10.0)).unwrap();
        store.store(at(2, 11, 15), Some(45.0), Some(11.0)).unwrap();

        let now = at(2, 12, 0);
        let chrono = store.query_at(now, Duration::hours(2), Order::Chronological).unwrap();
        let recent = store.query_at(now, Duration::hours(2), Order::MostRecentFirst).unwrap();

        let ts: Vec<_> = chrono.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![at(2, 11, 0), at(2, 11, 15), at(2, 11, 30)]);
        assert_eq!(recent[0].timestamp, at(2, 11, 30));
        assert_eq!(recent.len(), 3);
    }

    #[test]
    fn test_timestamps_stored_as_fixed_format_text() {
        let store = SampleStore::open_in_memory().unwrap();
        store.store(at(2, 11, 0), Some(40.0), None).unwrap();

        let conn = store.lock().unwrap();
        let (kind, text): (String, String) = conn
            .query_row("SELECT typeof(timestamp), timestamp FROM measurements", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(kind, "text");
        assert_eq!(text, "2024-03-02 11:00:00");
    }

    #[test]
    fn test_query_threshold_is_exclusive() {
        let store = SampleStore::open_in_memory().unwrap();
        store.store(at(2, 11, 0), Some(40.0), None).unwrap();
        store.store(at(2, 11, 1), Some(41.0), None).unwrap();

        let samples = store
            .query_at(at(2, 12, 0), Duration::hours(1), Order::Chronological)
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].temperature, Some(41.0));
    }

    #[test]
    fn test_partial_write_never_clears_field() {
        let store = SampleStore::open_in_memory().unwrap();
        let ts = at(2, 11, 0);
        store.store(ts, Some(60.0), Some(9.0)).unwrap();
        store.store(ts, Some(61.0), None).unwrap();

        let sample = store.latest().unwrap().unwrap();
        assert_eq!(sample.temperature, Some(61.0));
        assert_eq!(sample.humidity, Some(9.0));
    }

    #[test]
    fn test_empty_write_is_noop() {
        let store = SampleStore::open_in_memory().unwrap();
        store.store(at(2, 11, 0), None, None).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_freshness() {
        let store = SampleStore::open_in_memory().unwrap();
        let max_age = Duration::hours(DEFAULT_FRESHNESS_HOURS);

        // empty store is stale, not an error
        assert!(!store.is_fresh_at(at(2, 12, 0), max_age).unwrap());

        store.store(at(2, 10, 30), Some(30.0), None).unwrap();
        assert!(store.is_fresh_at(at(2, 12, 0), max_age).unwrap());
        assert!(store.is_fresh_at(at(2, 12, 30), max_age).unwrap());
        assert!(!store.is_fresh_at(at(2, 12, 31), max_age).unwrap());
    }

    #[test]
    fn test_prune_horizon() {
        let store = SampleStore::open_in_memory().unwrap();
        store.store(at(1, 9, 0), Some(20.0), Some(40.0)).unwrap();
        store.store(at(11, 13, 0), Some(21.0), Some(41.0)).unwrap();
        store.store(at(12, 9, 0), Some(22.0), Some(42.0)).unwrap();

        let removed = store.prune_at(at(21, 12, 0), DEFAULT_RETENTION_DAYS).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), 2);
    }
}
