//! On-disk journal of dose-ledger rows.
//!
//! Each toggle rewrites the whole row for `(prescription_id, day)` and a
//! reset deletes every row. The journal mirrors the in-memory ledger and is
//! only read back when a tracker starts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use super::sqlite::open_database;
use super::DatabaseError;
use crate::ledger::LedgerKey;
use crate::models::PrescriptionId;

pub struct LedgerJournal {
    conn: Mutex<Connection>,
}

impl LedgerJournal {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        tracing::debug!(path = %path.display(), "Opening ledger journal");
        Ok(Self::from_connection(open_database(path)?))
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::sqlite::open_memory_database()?))
    }

    /// Wrap a connection whose migrations have already run.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Read every stored row, ordered by day then prescription.
    pub fn load(&self) -> Result<Vec<(LedgerKey, Vec<bool>)>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT prescription_id, day, doses FROM dose_ledger
             ORDER BY day ASC, prescription_id ASC",
        )?;

        let raw_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw_rows
            .into_iter()
            .map(|(prescription_id, day, doses)| {
                let corrupt = |reason: String| DatabaseError::Corrupt {
                    prescription_id: prescription_id.clone(),
                    day: day.clone(),
                    reason,
                };
                let parsed_day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| corrupt(e.to_string()))?;
                let parsed_doses: Vec<bool> =
                    serde_json::from_str(&doses).map_err(|e| corrupt(e.to_string()))?;
                Ok((
                    LedgerKey::new(PrescriptionId::new(prescription_id.clone()), parsed_day),
                    parsed_doses,
                ))
            })
            .collect()
    }

    /// Insert or replace one row.
    pub fn save_row(&self, key: &LedgerKey, doses: &[bool]) -> Result<(), DatabaseError> {
        let encoded = serde_json::to_string(doses).map_err(|e| DatabaseError::Corrupt {
            prescription_id: key.prescription_id.to_string(),
            day: key.day.to_string(),
            reason: e.to_string(),
        })?;

        self.conn()?.execute(
            "INSERT INTO dose_ledger (prescription_id, day, doses, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(prescription_id, day)
             DO UPDATE SET doses = excluded.doses, updated_at = excluded.updated_at",
            params![
                key.prescription_id.as_str(),
                key.day.to_string(),
                encoded,
                chrono::Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Delete every row. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, DatabaseError> {
        Ok(self.conn()?.execute("DELETE FROM dose_ledger", [])?)
    }

    #[cfg(test)]
    pub(crate) fn row_count(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .conn()?
            .query_row("SELECT COUNT(*) FROM dose_ledger", [], |row| row.get(0))?)
    }
}
