//! Reading Store.
//!
//! Persists heat-exchanger readings to a local SQLite database and returns
//! the most recent rows newest first.
//!
//! # Storage layout
//!
//! A single table `heat_exchanger_readings` is created (if it does not
//! already exist):
//!
//! | column    | type | description                                      |
//! |-----------|------|--------------------------------------------------|
//! | id        | TEXT | UUID v4 primary key                              |
//! | timestamp | TEXT | RFC-3339 insert time, UTC, microsecond precision |
//! | t1        | REAL | Outdoor air in (°C)                              |
//! | t2        | REAL | Supply air (°C)                                  |
//! | t3        | REAL | Extract air (°C)                                 |
//! | t4        | REAL | Exhaust air out (°C)                             |
//!
//! Timestamps are written with a fixed width so text ordering matches time
//! ordering; rows inserted within the same microsecond fall back to `rowid`.
//!
//! # Example
//!
//! ```rust
//! use heatex_memory::store::SqliteReadingStore;
//!
//! let store = SqliteReadingStore::open_in_memory().unwrap();
//! assert_eq!(store.location(), ":memory:");
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use heatex_types::{DashboardError, PersistedReading, Reading};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from reading persistence.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection lock poisoned")]
    Poisoned,
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<StoreError> for DashboardError {
    fn from(err: StoreError) -> Self {
        DashboardError::Persistence(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ReadingStore trait
// ─────────────────────────────────────────────────────────────────────────────

/// Health summary used by the `/connections` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub backend: String,
    pub location: String,
    pub row_count: u64,
}

/// The persistence endpoint behind the database round-trip mode.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist `reading` and return the stored row.
    async fn insert(&self, reading: &Reading) -> Result<PersistedReading, StoreError>;

    /// Up to `limit` rows, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<PersistedReading>, StoreError>;

    /// Check the store is reachable and report what it holds.
    async fn probe(&self) -> Result<StoreInfo, StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteReadingStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed [`ReadingStore`].
///
/// Every query runs on tokio's blocking pool, so the trait methods need a
/// tokio runtime.  Clones share one connection.
#[derive(Clone)]
pub struct SqliteReadingStore {
    db: Arc<Database>,
}

struct Database {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteReadingStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, path.to_string())
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, location: String) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS heat_exchanger_readings (
                id        TEXT NOT NULL PRIMARY KEY,
                timestamp TEXT NOT NULL,
                t1        REAL NOT NULL,
                t2        REAL NOT NULL,
                t3        REAL NOT NULL,
                t4        REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_readings_timestamp
                ON heat_exchanger_readings (timestamp);",
        )?;
        debug!(location = %location, "reading store ready");
        Ok(Self {
            db: Arc::new(Database {
                conn: Mutex::new(conn),
                location,
            }),
        })
    }

    /// Filesystem path, or `":memory:"`.
    pub fn location(&self) -> &str {
        &self.db.location
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl Database {
    fn insert(&self, reading: &Reading) -> Result<PersistedReading, StoreError> {
        let row = PersistedReading {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            reading: *reading,
        };
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO heat_exchanger_readings (id, timestamp, t1, t2, t3, t4)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id.to_string(),
                row.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                reading.t1_outdoor_air_in,
                reading.t2_supply_air,
                reading.t3_extract_air,
                reading.t4_exhaust_air_out,
            ],
        )?;
        Ok(row)
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<PersistedReading>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, t1, t2, t3, t4
             FROM heat_exchanger_readings
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            let id: String = row.get(0)?;
            let ts: String = row.get(1)?;
            let reading = Reading::new(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?);
            Ok((id, ts, reading))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, ts, reading) = row?;
            let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("id '{id}': {e}")))?;
            let timestamp = ts
                .parse::<DateTime<Utc>>()
                .map_err(|e| StoreError::Corrupt(format!("timestamp '{ts}': {e}")))?;
            out.push(PersistedReading {
                id,
                timestamp,
                reading,
            });
        }
        Ok(out)
    }

    fn probe(&self) -> Result<StoreInfo, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM heat_exchanger_readings", [], |row| row.get(0))?;
        Ok(StoreInfo {
            backend: format!("SQLite {}", rusqlite::version()),
            location: self.location.clone(),
            row_count: u64::try_from(count).unwrap_or(0),
        })
    }
}

#[async_trait]
impl ReadingStore for SqliteReadingStore {
    async fn insert(&self, reading: &Reading) -> Result<PersistedReading, StoreError> {
        let reading = *reading;
        self.run_blocking(move |db| db.insert(&reading)).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PersistedReading>, StoreError> {
        self.run_blocking(move |db| db.list_recent(limit)).await
    }

    async fn probe(&self) -> Result<StoreInfo, StoreError> {
        self.run_blocking(Database::probe).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
