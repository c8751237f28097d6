//! SQLite inventory backend for large archives.

use super::{
    path_from_bytes, path_to_bytes, InventoryBackend, InventoryRecord, InventoryStats,
};
use crate::core::fingerprint::Fingerprint;
use crate::core::metadata::CaptureDate;
use crate::error::InventoryError;
use chrono::{DateTime, Utc};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

const COLUMNS: &str =
    "fingerprint, year, month, origin, destination, source, outcome, recorded_at, run_id";

/// SQLite-backed persistent inventory
///
/// Uses WAL (Write-Ahead Logging) mode. Every commit is its own transaction,
/// so a record is on disk before `commit` returns. Every row is decoded once
/// on open; a damaged database refuses to load.
pub struct SqliteInventory {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

fn db_err(e: rusqlite::Error) -> InventoryError {
    InventoryError::Database(e.to_string())
}

/// Paths go in as TEXT when they are UTF-8 and as BLOB when they are not
fn path_value(path: &Path) -> Value {
    match path.to_str() {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Blob(path_to_bytes(path)),
    }
}

fn path_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Ok(bytes.to_vec()),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "path".to_string(),
            other.data_type(),
        )),
    }
}

impl SqliteInventory {
    /// Open or create an inventory database at the given path
    pub fn open(path: &Path) -> Result<Self, InventoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| InventoryError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let unreadable = |e: rusqlite::Error| match e {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt
                ) =>
            {
                InventoryError::Corrupt {
                    path: path.to_path_buf(),
                    line: 0,
                    reason: e.to_string(),
                }
            }
            other => db_err(other),
        };

        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(unreadable)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                fingerprint TEXT PRIMARY KEY,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                origin TEXT NOT NULL,
                destination TEXT NOT NULL,
                source TEXT NOT NULL,
                outcome TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                run_id TEXT NOT NULL
            )",
            [],
        )
        .map_err(unreadable)?;

        let inventory = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        let count = inventory.records()?.len();
        info!(path = %path.display(), records = count, "Opened inventory database");

        Ok(inventory)
    }

    fn corrupt(&self, row: usize, reason: String) -> InventoryError {
        InventoryError::Corrupt {
            path: self.db_path.clone(),
            line: row,
            reason,
        }
    }

    /// Raw column values as stored, rowid first
    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            rowid: row.get(0)?,
            fingerprint: row.get(1)?,
            year: row.get(2)?,
            month: row.get(3)?,
            origin: row.get(4)?,
            destination: path_column(row, 5)?,
            source: path_column(row, 6)?,
            outcome: row.get(7)?,
            recorded_at: row.get(8)?,
            run_id: row.get(9)?,
        })
    }

    fn decode(&self, raw: RawRecord) -> Result<InventoryRecord, InventoryError> {
        let row = raw.rowid as usize;
        let fingerprint: Fingerprint = raw.fingerprint.parse().map_err(|e| self.corrupt(row, e))?;
        let origin = raw.origin.parse().map_err(|e| self.corrupt(row, e))?;
        let outcome = raw.outcome.parse().map_err(|e| self.corrupt(row, e))?;
        let recorded_at = DateTime::parse_from_rfc3339(&raw.recorded_at)
            .map_err(|e| self.corrupt(row, format!("bad timestamp {:?}: {e}", raw.recorded_at)))?
            .with_timezone(&Utc);
        let run_id = Uuid::parse_str(&raw.run_id)
            .map_err(|e| self.corrupt(row, format!("bad run id {:?}: {e}", raw.run_id)))?;
        if !(1..=12).contains(&raw.month) {
            return Err(self.corrupt(row, format!("bad month {}", raw.month)));
        }

        Ok(InventoryRecord {
            fingerprint,
            date: CaptureDate::new(raw.year as i32, raw.month as u32, origin),
            destination: path_from_bytes(raw.destination),
            source: path_from_bytes(raw.source),
            outcome,
            recorded_at,
            run_id,
        })
    }
}

struct RawRecord {
    rowid: i64,
    fingerprint: String,
    year: i64,
    month: i64,
    origin: String,
    destination: Vec<u8>,
    source: Vec<u8>,
    outcome: String,
    recorded_at: String,
    run_id: String,
}

impl InventoryBackend for SqliteInventory {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<InventoryRecord>, InventoryError> {
        let conn = self.conn.lock().map_err(|_| InventoryError::Poisoned)?;

        let raw = conn
            .query_row(
                &format!("SELECT rowid, {COLUMNS} FROM records WHERE fingerprint = ?"),
                [fingerprint.to_string()],
                Self::read_row,
            )
            .optional()
            .map_err(db_err)?;

        raw.map(|raw| self.decode(raw)).transpose()
    }

    fn commit(&self, record: InventoryRecord) -> Result<(), InventoryError> {
        let conn = self.conn.lock().map_err(|_| InventoryError::Poisoned)?;

        let result = conn.execute(
            &format!("INSERT INTO records ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                record.fingerprint.to_string(),
                record.date.year as i64,
                record.date.month as i64,
                record.date.origin.as_str(),
                path_value(&record.destination),
                path_value(&record.source),
                record.outcome.as_str(),
                record.recorded_at.to_rfc3339(),
                record.run_id.to_string(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(InventoryError::DuplicateCommit {
                    fingerprint: record.fingerprint.to_string(),
                })
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn len(&self) -> Result<usize, InventoryError> {
        let conn = self.conn.lock().map_err(|_| InventoryError::Poisoned)?;
        conn.query_row("SELECT COUNT(*) FROM records", [], |row| {
            row.get::<_, i64>(0).map(|v| v as usize)
        })
        .map_err(db_err)
    }

    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError> {
        let raws: Vec<RawRecord> = {
            let conn = self.conn.lock().map_err(|_| InventoryError::Poisoned)?;
            let mut stmt = conn
                .prepare(&format!("SELECT rowid, {COLUMNS} FROM records ORDER BY rowid"))
                .map_err(db_err)?;
            let rows = stmt.query_map([], Self::read_row).map_err(db_err)?;
            rows.collect::<rusqlite::Result<_>>().map_err(db_err)?
        };

        raws.into_iter().map(|raw| self.decode(raw)).collect()
    }

    fn stats(&self) -> Result<InventoryStats, InventoryError> {
        let conn = self.conn.lock().map_err(|_| InventoryError::Poisoned)?;

        let (total, placed, runs): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(outcome = 'placed'), 0),
                        COUNT(DISTINCT run_id)
                 FROM records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(db_err)?;

        let (oldest, newest): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT MIN(recorded_at), MAX(recorded_at) FROM records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;

        let parse = |s: Option<String>| {
            s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc))
        };

        Ok(InventoryStats {
            total_records: total as usize,
            placed: placed as usize,
            recovered: (total - placed) as usize,
            runs: runs as usize,
            oldest_record: parse(oldest),
            newest_record: parse(newest),
        })
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.db_path)
    }
}
