//! Adherence arithmetic and derived prescription predicates.
//!
//! Two adherence figures coexist and are never mixed:
//! - session adherence: share of today's doses checked in the ledger;
//! - long-run adherence: the percentage kept by the record service.

use chrono::NaiveDate;

use crate::models::{Prescription, PrescriptionStatus, LOW_STOCK_THRESHOLD};

/// `overall_adherence` was asked to average an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("adherence is undefined without prescriptions")]
pub struct AdherenceUndefined;

/// Percentage of `daily_doses` that are checked, rounded half up.
///
/// `checked` is clamped to `daily_doses`. Returns 0 when `daily_doses` is 0,
/// although validated prescriptions never have that.
pub fn session_percentage(checked: usize, daily_doses: usize) -> u8 {
    if daily_doses == 0 {
        return 0;
    }
    let checked = checked.min(daily_doses);
    // round(100 * c / n) == floor((200c + n) / 2n) for non-negative c, n
    let pct = (200 * checked + daily_doses) / (2 * daily_doses);
    pct as u8
}

/// Mean of the long-run `adherence` across `prescriptions`.
pub fn overall_adherence(prescriptions: &[Prescription]) -> Result<f64, AdherenceUndefined> {
    if prescriptions.is_empty() {
        return Err(AdherenceUndefined);
    }
    let total: f64 = prescriptions.iter().map(|p| p.adherence).sum();
    Ok(total / prescriptions.len() as f64)
}

pub fn is_low_stock(prescription: &Prescription) -> bool {
    prescription.pills_remaining <= LOW_STOCK_THRESHOLD
}

/// The refill date has been reached: the current supply is exhausted.
pub fn is_refill_due(prescription: &Prescription, today: NaiveDate) -> bool {
    prescription.refill_date <= today
}

/// Only active courses have doses to check off.
pub fn is_trackable(prescription: &Prescription) -> bool {
    prescription.status == PrescriptionStatus::Active
}
