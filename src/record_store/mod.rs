//! Patient record service contract.
//!
//! The tracker reads prescriptions from, and requests long-run adherence
//! resets on, an external record service. `HttpRecordStore` is the real
//! binding; `MockRecordStore` backs tests.

pub mod http;
#[cfg(test)]
pub mod mock;

use std::future::Future;

pub use http::HttpRecordStore;
#[cfg(test)]
pub use mock::MockRecordStore;

use crate::models::PrescriptionRecord;

/// Errors from the record service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Record service is not reachable at {0}")]
    Connection(String),

    #[error("Record service request timed out")]
    Timeout,

    #[error("Record service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid record service URL: {0}")]
    InvalidUrl(String),
}

/// Record service abstraction (allows mocking).
///
/// Prescriptions come back as raw JSON values so that each record can be
/// decoded and validated on its own.
pub trait RecordStore: Send + Sync {
    fn fetch_prescriptions(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, StoreError>> + Send;

    /// Zero the long-run adherence of every prescription of the patient.
    fn reset_adherence(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_prescription(
        &self,
        patient_id: &str,
        record: &PrescriptionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_prescription(
        &self,
        patient_id: &str,
        prescription_id: &str,
        record: &PrescriptionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_prescription(
        &self,
        patient_id: &str,
        prescription_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
