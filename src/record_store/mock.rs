use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{RecordStore, StoreError};
use crate::models::PrescriptionRecord;

/// In-memory record service for tests.
///
/// Behaves like the portal backend: ids are assigned on create, reset
/// zeroes every record's adherence, unknown ids answer 404. Failures and
/// latency can be injected per operation.
pub struct MockRecordStore {
    records: Mutex<Vec<serde_json::Value>>,
    fetch_error: Mutex<Option<StoreError>>,
    reset_error: Mutex<Option<StoreError>>,
    delay: Option<Duration>,
    fetch_calls: AtomicUsize,
    reset_calls: AtomicUsize,
}

impl MockRecordStore {
    pub fn new(records: Vec<serde_json::Value>) -> Self {
        Self {
            records: Mutex::new(records),
            fetch_error: Mutex::new(None),
            reset_error: Mutex::new(None),
            delay: None,
            fetch_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_fetch_error(self, error: StoreError) -> Self {
        self.set_fetch_error(Some(error));
        self
    }

    pub fn with_reset_error(self, error: StoreError) -> Self {
        self.set_reset_error(Some(error));
        self
    }

    pub fn set_fetch_error(&self, error: Option<StoreError>) {
        if let Ok(mut slot) = self.fetch_error.lock() {
            *slot = error;
        }
    }

    pub fn set_reset_error(&self, error: Option<StoreError>) {
        if let Ok(mut slot) = self.reset_error.lock() {
            *slot = error;
        }
    }

    pub fn set_records(&self, records: Vec<serde_json::Value>) {
        if let Ok(mut current) = self.records.lock() {
            *current = records;
        }
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn injected(slot: &Mutex<Option<StoreError>>) -> Option<StoreError> {
        slot.lock().ok().and_then(|e| e.clone())
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, Vec<serde_json::Value>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::HttpClient("mock store lock poisoned".into()))
    }

    fn not_found() -> StoreError {
        StoreError::Status {
            status: 404,
            body: "Prescription not found".into(),
        }
    }

    fn to_value(record: &PrescriptionRecord) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(record).map_err(|e| StoreError::ResponseParsing(e.to_string()))
    }
}

fn has_id(value: &serde_json::Value, id: &str) -> bool {
    value.get("id").and_then(|v| v.as_str()) == Some(id)
}

impl RecordStore for MockRecordStore {
    async fn fetch_prescriptions(
        &self,
        _patient_id: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = Self::injected(&self.fetch_error) {
            return Err(err);
        }
        Ok(self.lock_records()?.clone())
    }

    async fn reset_adherence(&self, _patient_id: &str) -> Result<(), StoreError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = Self::injected(&self.reset_error) {
            return Err(err);
        }
        for record in self.lock_records()?.iter_mut() {
            if let Some(obj) = record.as_object_mut() {
                obj.insert("adherence".into(), serde_json::json!(0));
            }
        }
        Ok(())
    }

    async fn create_prescription(
        &self,
        _patient_id: &str,
        record: &PrescriptionRecord,
    ) -> Result<(), StoreError> {
        self.pause().await;
        let mut records = self.lock_records()?;
        let mut stored = record.clone();
        if stored.id.is_none() {
            stored.id = Some((records.len() + 1).to_string());
        }
        records.push(Self::to_value(&stored)?);
        Ok(())
    }

    async fn update_prescription(
        &self,
        _patient_id: &str,
        prescription_id: &str,
        record: &PrescriptionRecord,
    ) -> Result<(), StoreError> {
        self.pause().await;
        let mut records = self.lock_records()?;
        let slot = records
            .iter_mut()
            .find(|r| has_id(r, prescription_id))
            .ok_or_else(Self::not_found)?;
        let mut stored = record.clone();
        stored.id = Some(prescription_id.to_string());
        *slot = Self::to_value(&stored)?;
        Ok(())
    }

    async fn delete_prescription(
        &self,
        _patient_id: &str,
        prescription_id: &str,
    ) -> Result<(), StoreError> {
        self.pause().await;
        let mut records = self.lock_records()?;
        let before = records.len();
        records.retain(|r| !has_id(r, prescription_id));
        if records.len() == before {
            return Err(Self::not_found());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::models::PrescriptionStatus;

    fn record(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "medication": "Metformin",
            "dosage": "500mg",
            "frequency": "Twice daily",
            "status": "active",
            "refill_date": "2024-03-20",
            "adherence": 85,
            "pills_remaining": 15,
            "total_pills": 60,
            "daily_doses": 2
        })
    }

    fn draft() -> PrescriptionRecord {
        PrescriptionRecord {
            id: None,
            medication: "Lisinopril".into(),
            dosage: "10mg".into(),
            frequency: "Once daily".into(),
            status: PrescriptionStatus::Active,
            refill_date: NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
            adherence: 92.0,
            pills_remaining: 8,
            total_pills: 30,
            daily_doses: 1,
        }
    }

    #[tokio::test]
    async fn fetch_returns_records_and_counts_calls() {
        let store = MockRecordStore::new(vec![record("1")]);
        let records = store.fetch_prescriptions("patient_1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn injected_fetch_error_is_returned_until_cleared() {
        let store = MockRecordStore::new(vec![record("1")]).with_fetch_error(StoreError::Timeout);
        assert_eq!(
            store.fetch_prescriptions("patient_1").await,
            Err(StoreError::Timeout)
        );
        store.set_fetch_error(None);
        assert!(store.fetch_prescriptions("patient_1").await.is_ok());
    }

    #[tokio::test]
    async fn reset_zeroes_adherence() {
        let store = MockRecordStore::new(vec![record("1"), record("2")]);
        store.reset_adherence("patient_1").await.unwrap();
        assert!(store.records().iter().all(|r| r["adherence"] == 0));
        assert_eq!(store.reset_calls(), 1);
    }

    #[tokio::test]
    async fn create_assigns_next_id() {
        let store = MockRecordStore::new(vec![record("1")]);
        store.create_prescription("patient_1", &draft()).await.unwrap();
        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], "2");
        assert_eq!(records[1]["medication"], "Lisinopril");
    }

    #[tokio::test]
    async fn update_and_delete_unknown_id_answer_not_found() {
        let store = MockRecordStore::new(vec![record("1")]);
        let err = store
            .update_prescription("patient_1", "9", &draft())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 404, .. }));

        let err = store.delete_prescription("patient_1", "9").await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn update_replaces_record_keeping_id() {
        let store = MockRecordStore::new(vec![record("1")]);
        store
            .update_prescription("patient_1", "1", &draft())
            .await
            .unwrap();
        let records = store.records();
        assert_eq!(records[0]["id"], "1");
        assert_eq!(records[0]["medication"], "Lisinopril");
    }
}
