use crate::error::Result;
use crate::model::{HistoryRecord, NewHistoryEntry, QueryOrder, TIMESTAMP_FORMAT};
use chrono::{Local, NaiveDateTime, Timelike};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT id, ip_address, country, city, latitude, longitude, timestamp FROM history";

/// Durable lookup history backed by a single SQLite table.
///
/// The store owns its connection and is not `Sync`: it lives on the
/// interactive thread and is never handed to lookup tasks.
pub struct HistoryStore {
    conn: Connection,
    last_timestamp: Option<NaiveDateTime>,
}

impl HistoryStore {
    /// Open (or create) the history database, creating parent directories.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip_address TEXT,
                country TEXT,
                city TEXT,
                latitude REAL,
                longitude REAL,
                timestamp TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp DESC)",
            [],
        )?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!("History store ready (journal_mode={})", mode);

        Ok(HistoryStore {
            conn,
            last_timestamp: None,
        })
    }

    /// Commit one record, stamped with the current local time.
    pub fn insert(&mut self, entry: &NewHistoryEntry) -> Result<HistoryRecord> {
        let timestamp = self.next_timestamp(Local::now().naive_local());
        self.insert_at(entry, timestamp)
    }

    pub(crate) fn insert_at(
        &mut self,
        entry: &NewHistoryEntry,
        timestamp: NaiveDateTime,
    ) -> Result<HistoryRecord> {
        self.conn.execute(
            "INSERT INTO history (ip_address, country, city, latitude, longitude, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.ip,
                entry.country,
                entry.city,
                entry.latitude,
                entry.longitude,
                timestamp.format(TIMESTAMP_FORMAT).to_string()
            ],
        )?;

        Ok(HistoryRecord {
            id: self.conn.last_insert_rowid(),
            ip: entry.ip.clone(),
            country: entry.country.clone(),
            city: entry.city.clone(),
            latitude: entry.latitude,
            longitude: entry.longitude,
            timestamp,
        })
    }

    /// Second-resolution timestamp, never earlier than the previous one.
    fn next_timestamp(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let now = now.with_nanosecond(0).unwrap_or(now);
        let stamped = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(stamped);
        stamped
    }

    pub fn query_all(&self, order: QueryOrder) -> Result<Vec<HistoryRecord>> {
        let order_clause = match order {
            QueryOrder::RecencyDesc => "ORDER BY timestamp DESC, id DESC",
            QueryOrder::InsertionAsc => "ORDER BY id ASC",
        };
        let mut stmt = self
            .conn
            .prepare(&format!("{} {}", SELECT_COLUMNS, order_clause))?;

        let records = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every record in one statement. Returns the number removed.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM history", [])?;
        Ok(removed)
    }

    /// Drop the table so later writes fail.
    #[cfg(test)]
    pub(crate) fn break_schema(&self) {
        self.conn.execute("DROP TABLE history", []).unwrap();
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
        let raw: String = row.get(6)?;
        let timestamp = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        Ok(HistoryRecord {
            id: row.get(0)?,
            ip: row.get(1)?,
            country: row.get(2)?,
            city: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use tempfile::tempdir;

    fn entry(ip: &str, city: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            ip: ip.to_string(),
            country: "US".to_string(),
            city: city.to_string(),
            latitude: 37.4056,
            longitude: -122.0775,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_insert_round_trip() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        store.insert_at(&entry("1.1.1.1", "Sydney"), at(9, 0, 0)).unwrap();
        let inserted = store
            .insert_at(&entry("8.8.8.8", "Mountain View"), at(10, 0, 0))
            .unwrap();

        let records = store.query_all(QueryOrder::RecencyDesc).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], inserted);
        assert_eq!(records[0].ip, "8.8.8.8");
        assert_eq!(records[0].latitude, 37.4056);
        assert_eq!(records[0].longitude, -122.0775);
        assert_eq!(records[0].timestamp, at(10, 0, 0));
    }

    #[test]
    fn test_query_orders() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        store.insert_at(&entry("1.1.1.1", "a"), at(12, 0, 0)).unwrap();
        store.insert_at(&entry("2.2.2.2", "b"), at(11, 0, 0)).unwrap();
        store.insert_at(&entry("3.3.3.3", "c"), at(12, 0, 0)).unwrap();

        let recent: Vec<String> = store
            .query_all(QueryOrder::RecencyDesc)
            .unwrap()
            .into_iter()
            .map(|r| r.ip)
            .collect();
        assert_eq!(recent, vec!["3.3.3.3", "1.1.1.1", "2.2.2.2"]);

        let inserted: Vec<String> = store
            .query_all(QueryOrder::InsertionAsc)
            .unwrap()
            .into_iter()
            .map(|r| r.ip)
            .collect();
        assert_eq!(inserted, vec!["1.1.1.1", "2.2.2.2", "3.3.3.3"]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert(&entry(&format!("10.0.0.{}", i), "x")).unwrap();
        }
        assert_eq!(store.count().unwrap(), 5);

        assert_eq!(store.clear().unwrap(), 5);
        assert!(store.query_all(QueryOrder::RecencyDesc).unwrap().is_empty());
        assert!(store.query_all(QueryOrder::InsertionAsc).unwrap().is_empty());

        assert_eq!(store.clear().unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        let first = store.next_timestamp(at(12, 0, 5));
        let second = store.next_timestamp(at(12, 0, 5) - Duration::seconds(30));
        let third = store.next_timestamp(at(12, 1, 0));

        assert_eq!(first, at(12, 0, 5));
        assert_eq!(second, first);
        assert_eq!(third, at(12, 1, 0));
    }

    #[test]
    fn test_insert_stamps_whole_seconds() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        let record = store.insert(&entry("9.9.9.9", "Zurich")).unwrap();
        assert_eq!(record.timestamp.nanosecond(), 0);

        let stored = store.query_all(QueryOrder::RecencyDesc).unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".ip_tracker").join("history.db");

        {
            let mut store = HistoryStore::open(&path).unwrap();
            store.insert(&entry("8.8.4.4", "Mountain View")).unwrap();
        }

        assert!(path.exists());
        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
