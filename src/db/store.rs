//! SQLite-backed target record store.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("target {0} not found")]
    NotFound(String),
    #[error("target {0} already exists")]
    AlreadyExists(String),
    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),
}

/// Load/save contract the check cycle persists through.
///
/// `load` and `save` are mutually exclusive with each other.
pub trait RecordStore: Send + Sync {
    /// Read every record; an unreadable store yields an empty collection.
    fn load(&self) -> RecordCollection;

    /// Replace the stored collection with `records`.
    fn save(&self, records: &RecordCollection) -> Result<(), DbError>;
}

const COLUMNS: &str = "name, url, is_up, last_success, last_failure, expected_content, \
     response_time_threshold_ms, last_response_time_ms, ssl_expiry, ssl_expiry_threshold_days, \
     last_ssl_notification, total_checks, successful_checks";

const INSERT_SQL: &str = "INSERT INTO targets (name, url, is_up, last_success, last_failure, \
     expected_content, response_time_threshold_ms, last_response_time_ms, ssl_expiry, \
     ssl_expiry_threshold_days, last_ssl_notification, total_checks, successful_checks) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // --- Registry ---

    /// Get all targets ordered by name.
    pub fn get_targets(&self) -> Result<Vec<TargetRecord>, DbError> {
        let conn = self.lock()?;
        Ok(read_all(&conn)?.into_values().collect())
    }

    /// Get a target by name.
    pub fn get_target(&self, name: &str) -> Result<TargetRecord, DbError> {
        let conn = self.lock()?;
        read_one(&conn, name)
    }

    /// Register a new target. The name defaults to the URL as given.
    pub fn add_target(&self, url: &str, name: Option<&str>) -> Result<TargetRecord, DbError> {
        let full_url = normalize_url(url).ok_or_else(|| DbError::InvalidUrl(url.to_string()))?;
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => url.trim().to_string(),
        };

        let conn = self.lock()?;
        if exists(&conn, &name)? {
            return Err(DbError::AlreadyExists(name));
        }

        let record = TargetRecord::new(name, full_url);
        insert_record(&conn, &record)?;
        tracing::info!("Store: Added target {} [{}]", record.name, record.url);
        Ok(record)
    }

    /// Apply `update` to the named target and persist it.
    pub fn update_target<F>(&self, name: &str, update: F) -> Result<TargetRecord, DbError>
    where
        F: FnOnce(&mut TargetRecord),
    {
        let conn = self.lock()?;
        let mut record = read_one(&conn, name)?;
        update(&mut record);
        // Names are immutable once a record exists.
        record.name = name.to_string();

        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM targets WHERE name = ?1", params![name])?;
        insert_record(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }

    /// Delete a target by name.
    pub fn remove_target(&self, name: &str) -> Result<(), DbError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM targets WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(DbError::NotFound(name.to_string()));
        }
        tracing::info!("Store: Removed target {}", name);
        Ok(())
    }

    /// Delete every target.
    pub fn remove_all(&self) -> Result<(), DbError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM targets", [])?;
        tracing::info!("Store: Removed all targets");
        Ok(())
    }
}

impl RecordStore for Store {
    fn load(&self) -> RecordCollection {
        let result = self.lock().and_then(|conn| read_all(&conn));
        match result {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Store: Failed to load target records: {}", e);
                RecordCollection::new()
            }
        }
    }

    fn save(&self, records: &RecordCollection) -> Result<(), DbError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM targets", [])?;
        for record in records.values() {
            insert_record(&tx, record)?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn read_all(conn: &Connection) -> Result<RecordCollection, DbError> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM targets ORDER BY name", COLUMNS))?;
    let records = stmt
        .query_map([], record_from_row)?
        .collect::<SqlResult<Vec<_>>>()?;

    Ok(records.into_iter().map(|r| (r.name.clone(), r)).collect())
}

fn read_one(conn: &Connection, name: &str) -> Result<TargetRecord, DbError> {
    conn.query_row(
        &format!("SELECT {} FROM targets WHERE name = ?1", COLUMNS),
        params![name],
        record_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(name.to_string()),
        other => DbError::Sqlite(other),
    })
}

fn exists(conn: &Connection, name: &str) -> Result<bool, DbError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM targets WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_record(conn: &Connection, r: &TargetRecord) -> SqlResult<usize> {
    conn.execute(
        INSERT_SQL,
        params![
            r.name,
            r.url,
            r.is_up,
            r.last_success_at.as_ref().map(format_db_time),
            r.last_failure_at.as_ref().map(format_db_time),
            r.expected_content,
            to_sql_int(r.response_time_threshold_ms)?,
            to_sql_int(r.last_response_time_ms)?,
            r.ssl_expiry.as_ref().map(format_db_time),
            r.ssl_expiry_threshold_days as i64,
            r.last_ssl_notification_at.as_ref().map(format_db_time),
            to_sql_int(r.total_checks)?,
            to_sql_int(r.successful_checks)?,
        ],
    )
}

/// SQLite integers are signed; values past `i64::MAX` are refused.
fn to_sql_int(v: u64) -> SqlResult<i64> {
    i64::try_from(v).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn record_from_row(row: &Row<'_>) -> SqlResult<TargetRecord> {
    let time_col = |idx: usize| -> SqlResult<Option<DateTime<Utc>>> {
        let s: Option<String> = row.get(idx)?;
        Ok(s.as_deref().and_then(parse_db_time))
    };

    Ok(TargetRecord {
        name: row.get(0)?,
        url: row.get(1)?,
        is_up: row.get(2)?,
        last_success_at: time_col(3)?,
        last_failure_at: time_col(4)?,
        expected_content: row.get(5)?,
        response_time_threshold_ms: row.get::<_, i64>(6)?.max(0) as u64,
        last_response_time_ms: row.get::<_, i64>(7)?.max(0) as u64,
        ssl_expiry: time_col(8)?,
        ssl_expiry_threshold_days: row.get::<_, i64>(9)?.max(0) as u32,
        last_ssl_notification_at: time_col(10)?,
        total_checks: row.get::<_, i64>(11)?.max(0) as u64,
        successful_checks: row.get::<_, i64>(12)?.max(0) as u64,
    })
}

fn format_db_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = ["%Y-%m-%d %H:%M:%S%.9f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
