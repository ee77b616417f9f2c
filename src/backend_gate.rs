//! Single-flight gate for record service calls.
//!
//! Only one backend call (fetch, reset, or a prescription edit) may be in
//! flight per tracker. A call attempted while another is pending is
//! rejected, not queued, so the prescription cache is never written by
//! two overlapping responses.
//!
//! - `try_acquire()` returns `None` if busy
//! - `current_operation()` reports what is running and since when
//! - dropping the guard (including dropping the future holding it) frees the gate

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What kind of backend operation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ListPrescriptions,
    ResetAdherence,
    CreatePrescription,
    UpdatePrescription,
    DeletePrescription,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListPrescriptions => write!(f, "List prescriptions"),
            Self::ResetAdherence => write!(f, "Reset adherence"),
            Self::CreatePrescription => write!(f, "Create prescription"),
            Self::UpdatePrescription => write!(f, "Update prescription"),
            Self::DeletePrescription => write!(f, "Delete prescription"),
        }
    }
}

/// Snapshot of the currently running backend operation.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    /// When the operation started (ISO 8601).
    pub started_at: String,
}

// ═══════════════════════════════════════════════════════════
// BackendGate
// ═══════════════════════════════════════════════════════════

pub struct BackendGate {
    in_flight: AtomicBool,
    current_op: Mutex<Option<ActiveOperation>>,
}

impl BackendGate {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            current_op: Mutex::new(None),
        }
    }

    /// Claim the gate without waiting. `None` if another call is in flight.
    pub fn try_acquire(&self, kind: OperationKind) -> Option<GateGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.set_current_op(kind);
        Some(GateGuard { gate: self })
    }

    /// What operation is currently running? `None` when idle.
    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.current_op.lock().ok()?.clone()
    }

    // ── Internal ────────────────────────────────────────────

    fn set_current_op(&self, kind: OperationKind) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = Some(ActiveOperation {
                kind,
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
    }

    fn release(&self) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = None;
        }
        self.in_flight.store(false, Ordering::Release);
    }
}

impl Default for BackendGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII token for the gate. Dropping it frees the gate and clears the
/// current operation.
pub struct GateGuard<'a> {
    gate: &'a BackendGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_starts_idle() {
        let gate = BackendGate::new();
        assert!(gate.current_operation().is_none());
        assert!(gate.try_acquire(OperationKind::ListPrescriptions).is_some());
    }

    #[test]
    fn acquire_sets_current_operation() {
        let gate = BackendGate::new();
        let _guard = gate.try_acquire(OperationKind::ListPrescriptions).unwrap();
        let op = gate.current_operation().unwrap();
        assert_eq!(op.kind, OperationKind::ListPrescriptions);
        assert!(!op.started_at.is_empty());
    }

    #[test]
    fn second_acquire_rejected_while_held() {
        let gate = BackendGate::new();
        let _guard = gate.try_acquire(OperationKind::ResetAdherence).unwrap();
        assert!(gate.try_acquire(OperationKind::ListPrescriptions).is_none());
        // The running operation is not overwritten by the rejected one
        assert_eq!(
            gate.current_operation().unwrap().kind,
            OperationKind::ResetAdherence
        );
    }

    #[test]
    fn drop_releases_gate() {
        let gate = BackendGate::new();
        {
            let _guard = gate.try_acquire(OperationKind::CreatePrescription).unwrap();
        }
        assert!(gate.current_operation().is_none());
        assert!(gate.try_acquire(OperationKind::DeletePrescription).is_some());
    }

    #[test]
    fn operation_kind_display_and_serde() {
        assert_eq!(OperationKind::ResetAdherence.to_string(), "Reset adherence");
        let json = serde_json::to_string(&OperationKind::UpdatePrescription).unwrap();
        assert_eq!(json, "\"update_prescription\"");
    }
}
