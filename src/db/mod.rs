pub mod ledger_journal;
pub mod sqlite;

pub use ledger_journal::LedgerJournal;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Corrupt ledger row for {prescription_id} on {day}: {reason}")]
    Corrupt {
        prescription_id: String,
        day: String,
        reason: String,
    },

    #[error("Journal lock poisoned")]
    LockPoisoned,
}
