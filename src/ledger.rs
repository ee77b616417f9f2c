//! Dose-check ledger: which doses were marked taken, per prescription and
//! calendar day.
//!
//! Rows are created lazily on the first toggle. A missing row means no
//! dose has been checked that day. Rows for past days are only ever
//! removed by [`DoseLedger::clear`].

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::PrescriptionId;

/// Composite ledger key: one prescription on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub prescription_id: PrescriptionId,
    pub day: NaiveDate,
}

impl LedgerKey {
    pub fn new(prescription_id: PrescriptionId, day: NaiveDate) -> Self {
        Self { prescription_id, day }
    }
}

/// In-memory ledger of dose checks.
#[derive(Debug, Default, Clone)]
pub struct DoseLedger {
    rows: HashMap<LedgerKey, Vec<bool>>,
}

impl DoseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether dose `dose_index` is checked. Missing rows and indices past
    /// the end of a row read as unchecked.
    pub fn is_checked(&self, id: &PrescriptionId, day: NaiveDate, dose_index: usize) -> bool {
        self.row(id, day)
            .and_then(|row| row.get(dose_index).copied())
            .unwrap_or(false)
    }

    /// Flip one dose and return its new state.
    ///
    /// The row is created (all unchecked) if absent, and resized to
    /// `daily_doses` if the prescription's schedule changed since it was
    /// written. Caller validates `dose_index < daily_doses`.
    pub fn toggle(
        &mut self,
        id: &PrescriptionId,
        day: NaiveDate,
        dose_index: usize,
        daily_doses: usize,
    ) -> bool {
        let row = self
            .rows
            .entry(LedgerKey::new(id.clone(), day))
            .or_insert_with(|| vec![false; daily_doses]);
        row.resize(daily_doses, false);
        row[dose_index] = !row[dose_index];
        row[dose_index]
    }

    /// Number of checked doses among the first `daily_doses` entries.
    pub fn checked_count(&self, id: &PrescriptionId, day: NaiveDate, daily_doses: usize) -> usize {
        self.row(id, day)
            .map(|row| row.iter().take(daily_doses).filter(|checked| **checked).count())
            .unwrap_or(0)
    }

    pub fn row(&self, id: &PrescriptionId, day: NaiveDate) -> Option<&[bool]> {
        // HashMap lookup needs an owned key; ids are short strings.
        self.rows
            .get(&LedgerKey::new(id.clone(), day))
            .map(Vec::as_slice)
    }

    /// Restore a row read back from the journal.
    pub fn insert_row(&mut self, key: LedgerKey, doses: Vec<bool>) {
        self.rows.insert(key, doses);
    }

    /// Remove every row for every prescription and day.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
