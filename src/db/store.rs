//! SQLite database store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use crate::metrics::Percentiles;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Connection lock poisoned")]
    Poisoned,
    #[error("Not found")]
    NotFound,
}

/// Destination for per-cycle metric writes.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Overwrite the metric fields of one target. Idempotent.
    async fn update_metrics(&self, update: &MetricsUpdate) -> Result<(), DbError>;
}

const TARGET_COLUMNS: &str = "id, name, url, last_status, latency_ms, latency_window, uptime, stability, \
     p50, p90, p95, p99, ssl_valid, ssl_days_remaining, health, last_checked";

/// Thread-safe database store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    // --- Target management ---

    /// Add a new target and return its ID.
    pub fn add_target(&self, target: &mut Target) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO targets (name, url) VALUES (?1, ?2)",
            params![target.name, target.url],
        )?;
        let id = conn.last_insert_rowid();
        target.id = id;
        Ok(id)
    }

    /// Get all targets.
    pub fn get_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM targets ORDER BY id", TARGET_COLUMNS))?;
        let targets = stmt
            .query_map([], row_to_target)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(targets)
    }

    /// Get a target by ID.
    pub fn get_target(&self, id: i64) -> Result<Target, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM targets WHERE id = ?1", TARGET_COLUMNS),
            params![id],
            row_to_target,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    // --- Metrics ---

    /// Write the metric columns of a target.
    pub fn write_metrics(&self, update: &MetricsUpdate) -> Result<(), DbError> {
        let window = serde_json::to_string(&update.latency_window)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE targets SET last_status=?1, latency_ms=?2, latency_window=?3, uptime=?4, stability=?5,
             p50=?6, p90=?7, p95=?8, p99=?9, ssl_valid=?10, ssl_days_remaining=?11, health=?12, last_checked=?13
             WHERE id=?14",
            params![
                update.status.as_str(),
                update.latency_ms as i64,
                window,
                update.uptime,
                update.stability,
                update.percentiles.p50 as i64,
                update.percentiles.p90 as i64,
                update.percentiles.p95 as i64,
                update.percentiles.p99 as i64,
                update.ssl_valid,
                update.ssl_days_remaining,
                update.health.as_str(),
                update.checked_at.format("%Y-%m-%d %H:%M:%S%.9f").to_string(),
                update.target_id,
            ],
        )?;

        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for SqliteStore {
    async fn update_metrics(&self, update: &MetricsUpdate) -> Result<(), DbError> {
        self.write_metrics(update)
    }
}

fn row_to_target(row: &Row<'_>) -> SqlResult<Target> {
    let last_status: Option<String> = row.get(3)?;
    let latency_ms: Option<i64> = row.get(4)?;
    let window: String = row.get(5)?;
    let health: Option<String> = row.get(14)?;
    let last_checked: Option<String> = row.get(15)?;

    Ok(Target {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        last_status: last_status.and_then(|s| s.parse().ok()),
        latency_ms: latency_ms.map(|l| l as u64),
        latency_window: serde_json::from_str(&window).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
        })?,
        uptime: row.get(6)?,
        stability: row.get(7)?,
        percentiles: Percentiles {
            p50: row.get::<_, i64>(8)? as u64,
            p90: row.get::<_, i64>(9)? as u64,
            p95: row.get::<_, i64>(10)? as u64,
            p99: row.get::<_, i64>(11)? as u64,
        },
        ssl_valid: row.get(12)?,
        ssl_days_remaining: row.get(13)?,
        health: health.and_then(|s| s.parse().ok()),
        last_checked: last_checked.as_deref().and_then(parse_db_time),
    })
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
