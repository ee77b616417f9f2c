//! Adherence tracker: prescriptions of one patient, today's dose checks,
//! and the adherence figures derived from them.
//!
//! Dose operations are synchronous and work on the in-memory ledger.
//! Operations that reach the record service are async and go through the
//! [`BackendGate`], so at most one of them is in flight at a time.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::NaiveDate;
use serde::Serialize;

use crate::adherence::{self, AdherenceUndefined};
use crate::backend_gate::{ActiveOperation, BackendGate, GateGuard, OperationKind};
use crate::clock::{Clock, SystemClock};
use crate::db::{DatabaseError, LedgerJournal};
use crate::ledger::{DoseLedger, LedgerKey};
use crate::models::{
    decode_prescription, InvalidPrescription, Prescription, PrescriptionError, PrescriptionId,
    PrescriptionRecord, PrescriptionStatus,
};
use crate::record_store::{RecordStore, StoreError};

// ═══════════════════════════════════════════════════════════
// Errors and results
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Prescriptions unavailable: {0}")]
    DataUnavailable(#[source] StoreError),

    #[error("Dose index {dose_index} out of range for prescription {prescription_id} ({daily_doses} doses per day)")]
    InvalidDoseIndex {
        prescription_id: String,
        dose_index: usize,
        daily_doses: u32,
    },

    #[error(transparent)]
    InvalidPrescription(#[from] InvalidPrescription),

    #[error("Adherence is undefined without prescriptions")]
    AdherenceUndefined,

    #[error("Unknown prescription: {0}")]
    UnknownPrescription(String),

    #[error("{operation} rejected: another record service call is in flight")]
    Busy { operation: OperationKind },

    #[error("Record service error: {0}")]
    Backend(#[source] StoreError),

    #[error("Ledger journal error: {0}")]
    Journal(#[from] DatabaseError),

    #[error("Internal lock error")]
    LockPoisoned,
}

impl From<AdherenceUndefined> for TrackerError {
    fn from(_: AdherenceUndefined) -> Self {
        TrackerError::AdherenceUndefined
    }
}

/// Result of a prescription fetch: the records now tracked, and the ones
/// excluded because they failed validation.
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub prescriptions: Vec<Prescription>,
    pub rejected: Vec<InvalidPrescription>,
}

/// How far a reset got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResetOutcome {
    /// Ledger cleared and the record service zeroed long-run adherence.
    Complete,
    /// Ledger cleared, but the record service did not acknowledge the
    /// reset; long-run adherence may still show the old figures.
    LongRunStale { reason: String },
}

/// One prescription as shown on today's adherence card.
#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionDay {
    pub id: PrescriptionId,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub status: PrescriptionStatus,
    pub refill_date: NaiveDate,
    pub pills_remaining: u32,
    pub total_pills: u32,
    /// Today's checks, one per scheduled dose.
    pub doses: Vec<bool>,
    pub session_adherence: u8,
    pub long_run_adherence: f64,
    pub low_stock: bool,
    pub refill_due: bool,
    pub trackable: bool,
}

/// Serializable view of the tracker for one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct AdherenceSnapshot {
    pub patient_id: String,
    pub day: NaiveDate,
    pub prescriptions: Vec<PrescriptionDay>,
    /// Mean long-run adherence; `None` without prescriptions.
    pub overall_long_run: Option<f64>,
    /// Mean of today's session percentages; `None` without prescriptions.
    pub overall_session: Option<f64>,
}

// ═══════════════════════════════════════════════════════════
// AdherenceTracker
// ═══════════════════════════════════════════════════════════

pub struct AdherenceTracker<S, C = SystemClock> {
    patient_id: String,
    store: S,
    clock: C,
    /// Last successfully fetched prescriptions.
    prescriptions: RwLock<Vec<Prescription>>,
    ledger: Mutex<DoseLedger>,
    gate: BackendGate,
    journal: Option<LedgerJournal>,
}

impl<S: RecordStore> AdherenceTracker<S, SystemClock> {
    pub fn new(patient_id: impl Into<String>, store: S) -> Self {
        Self::with_clock(patient_id, store, SystemClock)
    }
}

impl<S: RecordStore, C: Clock> AdherenceTracker<S, C> {
    pub fn with_clock(patient_id: impl Into<String>, store: S, clock: C) -> Self {
        Self {
            patient_id: patient_id.into(),
            store,
            clock,
            prescriptions: RwLock::new(Vec::new()),
            ledger: Mutex::new(DoseLedger::new()),
            gate: BackendGate::new(),
            journal: None,
        }
    }

    /// Persist ledger rows to `journal`, restoring whatever it already holds.
    pub fn with_journal(mut self, journal: LedgerJournal) -> Result<Self, TrackerError> {
        let rows = journal.load()?;
        let restored = rows.len();
        {
            let ledger = self
                .ledger
                .get_mut()
                .map_err(|_| TrackerError::LockPoisoned)?;
            for (key, doses) in rows {
                ledger.insert_row(key, doses);
            }
        }
        tracing::info!(restored, "Ledger restored from journal");
        self.journal = Some(journal);
        Ok(self)
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Today's ledger key date, patient-local.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Backend call currently in flight, if any.
    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.gate.current_operation()
    }

    /// The last successfully fetched prescriptions.
    pub fn cached_prescriptions(&self) -> Result<Vec<Prescription>, TrackerError> {
        Ok(self
            .prescriptions
            .read()
            .map_err(|_| TrackerError::LockPoisoned)?
            .clone())
    }

    pub fn prescription(&self, prescription_id: &str) -> Result<Prescription, TrackerError> {
        self.prescriptions
            .read()
            .map_err(|_| TrackerError::LockPoisoned)?
            .iter()
            .find(|p| p.id.as_str() == prescription_id)
            .cloned()
            .ok_or_else(|| TrackerError::UnknownPrescription(prescription_id.to_string()))
    }

    /// Number of ledger rows held in memory, across all days.
    pub fn ledger_row_count(&self) -> Result<usize, TrackerError> {
        Ok(self.lock_ledger()?.len())
    }

    // ── Record service operations ───────────────────────────

    /// Fetch, validate and cache the patient's prescriptions.
    ///
    /// Invalid records are excluded and reported; a failed fetch keeps the
    /// previous cache. No retry is attempted.
    pub async fn list_prescriptions(&self) -> Result<FetchReport, TrackerError> {
        let _guard = self.acquire(OperationKind::ListPrescriptions)?;
        self.fetch_and_cache().await
    }

    /// Clear every ledger row, then ask the record service to zero long-run
    /// adherence.
    ///
    /// The local clear is never rolled back. A record service failure is
    /// reported as [`ResetOutcome::LongRunStale`].
    pub async fn reset_all(&self) -> Result<ResetOutcome, TrackerError> {
        let _guard = self.acquire(OperationKind::ResetAdherence)?;

        let cleared = {
            let mut ledger = self.lock_ledger()?;
            if let Some(journal) = &self.journal {
                journal.clear()?;
            }
            let rows = ledger.len();
            ledger.clear();
            rows
        };
        tracing::info!(patient_id = %self.patient_id, cleared, "Dose ledger cleared");

        match self.store.reset_adherence(&self.patient_id).await {
            Ok(()) => {
                let mut prescriptions = self
                    .prescriptions
                    .write()
                    .map_err(|_| TrackerError::LockPoisoned)?;
                for p in prescriptions.iter_mut() {
                    p.adherence = 0.0;
                }
                tracing::info!(patient_id = %self.patient_id, "Long-run adherence reset");
                Ok(ResetOutcome::Complete)
            }
            Err(e) => {
                tracing::warn!(
                    patient_id = %self.patient_id,
                    error = %e,
                    "Adherence reset not acknowledged; long-run figures may be stale"
                );
                Ok(ResetOutcome::LongRunStale {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Create a prescription on the record service and refresh the cache.
    pub async fn add_prescription(
        &self,
        draft: PrescriptionRecord,
    ) -> Result<FetchReport, TrackerError> {
        Self::validate_draft(&draft)?;
        let _guard = self.acquire(OperationKind::CreatePrescription)?;

        self.store
            .create_prescription(&self.patient_id, &draft)
            .await
            .map_err(TrackerError::Backend)?;
        tracing::info!(medication = %draft.medication, "Prescription created");
        self.fetch_and_cache().await
    }

    /// Replace a cached prescription on the record service and refresh.
    pub async fn update_prescription(
        &self,
        prescription_id: &str,
        draft: PrescriptionRecord,
    ) -> Result<FetchReport, TrackerError> {
        Self::validate_draft(&draft)?;
        self.prescription(prescription_id)?;
        let _guard = self.acquire(OperationKind::UpdatePrescription)?;

        self.store
            .update_prescription(&self.patient_id, prescription_id, &draft)
            .await
            .map_err(TrackerError::Backend)?;
        tracing::info!(prescription_id, "Prescription updated");
        self.fetch_and_cache().await
    }

    /// Delete a prescription on the record service and refresh.
    ///
    /// Ledger rows of the removed prescription are kept; only a full reset
    /// removes ledger rows.
    pub async fn remove_prescription(
        &self,
        prescription_id: &str,
    ) -> Result<FetchReport, TrackerError> {
        self.prescription(prescription_id)?;
        let _guard = self.acquire(OperationKind::DeletePrescription)?;

        self.store
            .delete_prescription(&self.patient_id, prescription_id)
            .await
            .map_err(TrackerError::Backend)?;
        tracing::info!(prescription_id, "Prescription deleted");
        self.fetch_and_cache().await
    }

    // ── Dose operations (today) ─────────────────────────────

    /// Whether dose `dose_index` of the prescription is checked today.
    pub fn is_dose_checked(
        &self,
        prescription_id: &str,
        dose_index: usize,
    ) -> Result<bool, TrackerError> {
        let prescription = self.prescription(prescription_id)?;
        Self::check_dose_index(&prescription, dose_index)?;
        let today = self.clock.today();
        Ok(self
            .lock_ledger()?
            .is_checked(&prescription.id, today, dose_index))
    }

    /// Flip dose `dose_index` of the prescription for today.
    pub fn toggle_dose(&self, prescription_id: &str, dose_index: usize) -> Result<(), TrackerError> {
        let prescription = self.prescription(prescription_id)?;
        Self::check_dose_index(&prescription, dose_index)?;
        let today = self.clock.today();
        let daily_doses = prescription.daily_doses as usize;

        let mut ledger = self.lock_ledger()?;
        let checked = ledger.toggle(&prescription.id, today, dose_index, daily_doses);

        if let Some(journal) = &self.journal {
            let key = LedgerKey::new(prescription.id.clone(), today);
            let row = ledger.row(&prescription.id, today).unwrap_or_default();
            if let Err(e) = journal.save_row(&key, row) {
                // Keep memory and journal in step
                ledger.toggle(&prescription.id, today, dose_index, daily_doses);
                return Err(e.into());
            }
        }

        tracing::debug!(prescription_id, dose_index, checked, %today, "Dose toggled");
        Ok(())
    }

    /// Share of today's doses checked, as a whole percentage (half up).
    pub fn calculate_actual_adherence(&self, prescription_id: &str) -> Result<u8, TrackerError> {
        let prescription = self.prescription(prescription_id)?;
        let today = self.clock.today();
        let daily_doses = prescription.daily_doses as usize;
        let checked = self
            .lock_ledger()?
            .checked_count(&prescription.id, today, daily_doses);
        Ok(adherence::session_percentage(checked, daily_doses))
    }

    /// Mean long-run adherence of `prescriptions`.
    pub fn overall_adherence(&self, prescriptions: &[Prescription]) -> Result<f64, TrackerError> {
        Ok(adherence::overall_adherence(prescriptions)?)
    }

    /// Today's view of every cached prescription.
    pub fn snapshot(&self) -> Result<AdherenceSnapshot, TrackerError> {
        let today = self.clock.today();
        let prescriptions = self.cached_prescriptions()?;

        let days: Vec<PrescriptionDay> = {
            let ledger = self.lock_ledger()?;
            prescriptions
                .iter()
                .map(|p| {
                    let daily_doses = p.daily_doses as usize;
                    let doses = (0..daily_doses)
                        .map(|i| ledger.is_checked(&p.id, today, i))
                        .collect();
                    let checked = ledger.checked_count(&p.id, today, daily_doses);
                    PrescriptionDay {
                        id: p.id.clone(),
                        medication: p.medication.clone(),
                        dosage: p.dosage.clone(),
                        frequency: p.frequency.clone(),
                        status: p.status,
                        refill_date: p.refill_date,
                        pills_remaining: p.pills_remaining,
                        total_pills: p.total_pills,
                        doses,
                        session_adherence: adherence::session_percentage(checked, daily_doses),
                        long_run_adherence: p.adherence,
                        low_stock: adherence::is_low_stock(p),
                        refill_due: adherence::is_refill_due(p, today),
                        trackable: adherence::is_trackable(p),
                    }
                })
                .collect()
        };

        let overall_session = if days.is_empty() {
            None
        } else {
            let total: f64 = days.iter().map(|d| f64::from(d.session_adherence)).sum();
            Some(total / days.len() as f64)
        };

        Ok(AdherenceSnapshot {
            patient_id: self.patient_id.clone(),
            day: today,
            overall_long_run: adherence::overall_adherence(&prescriptions).ok(),
            overall_session,
            prescriptions: days,
        })
    }

    // ── Internal ────────────────────────────────────────────

    fn acquire(&self, requested: OperationKind) -> Result<GateGuard<'_>, TrackerError> {
        self.gate.try_acquire(requested).ok_or_else(|| {
            tracing::debug!(%requested, "Record service busy, call rejected");
            TrackerError::Busy { operation: requested }
        })
    }

    fn lock_ledger(&self) -> Result<MutexGuard<'_, DoseLedger>, TrackerError> {
        self.ledger.lock().map_err(|_| TrackerError::LockPoisoned)
    }

    /// Fetch and replace the cache. Caller holds the gate.
    async fn fetch_and_cache(&self) -> Result<FetchReport, TrackerError> {
        tracing::info!(patient_id = %self.patient_id, "Fetching prescriptions");

        let raw = self
            .store
            .fetch_prescriptions(&self.patient_id)
            .await
            .map_err(|e| {
                tracing::warn!(
                    patient_id = %self.patient_id,
                    error = %e,
                    "Prescription fetch failed; keeping last known list"
                );
                TrackerError::DataUnavailable(e)
            })?;

        let mut accepted: Vec<Prescription> = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();
        let mut seen_ids = HashSet::new();

        for value in raw {
            let outcome = decode_prescription(value).and_then(|p| {
                if seen_ids.insert(p.id.clone()) {
                    Ok(p)
                } else {
                    Err(InvalidPrescription {
                        id: Some(p.id.to_string()),
                        reason: PrescriptionError::DuplicateId,
                    })
                }
            });
            match outcome {
                Ok(p) => accepted.push(p),
                Err(invalid) => {
                    tracing::warn!(
                        id = invalid.id.as_deref().unwrap_or("<no id>"),
                        reason = %invalid.reason,
                        "Rejected prescription record"
                    );
                    rejected.push(invalid);
                }
            }
        }

        *self
            .prescriptions
            .write()
            .map_err(|_| TrackerError::LockPoisoned)? = accepted.clone();

        tracing::info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            "Prescriptions loaded"
        );

        Ok(FetchReport {
            prescriptions: accepted,
            rejected,
        })
    }

    fn validate_draft(draft: &PrescriptionRecord) -> Result<(), TrackerError> {
        draft.check_invariants().map_err(|reason| {
            TrackerError::InvalidPrescription(InvalidPrescription {
                id: draft.id.clone(),
                reason,
            })
        })
    }

    fn check_dose_index(prescription: &Prescription, dose_index: usize) -> Result<(), TrackerError> {
        if dose_index >= prescription.daily_doses as usize {
            return Err(TrackerError::InvalidDoseIndex {
                prescription_id: prescription.id.to_string(),
                dose_index,
                daily_doses: prescription.daily_doses,
            });
        }
        Ok(())
    }
}
