use std::time::Duration;

use reqwest::{Response, Url};
use serde::Deserialize;

use super::{RecordStore, StoreError};
use crate::config::TrackerConfig;
use crate::models::PrescriptionRecord;

/// JSON-over-HTTP client for the patient record service.
///
/// Only a connect timeout is set; requests wait for the service to answer.
pub struct HttpRecordStore {
    base_url: Url,
    client: reqwest::Client,
}

/// Response body of `GET prescriptions/{patient_id}`
#[derive(Deserialize)]
struct PrescriptionsEnvelope {
    prescriptions: Vec<serde_json::Value>,
}

impl HttpRecordStore {
    pub fn new(base_url: &str, connect_timeout_secs: u64) -> Result<Self, StoreError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed =
            Url::parse(trimmed).map_err(|e| StoreError::InvalidUrl(format!("{trimmed}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(trimmed.to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .build()
            .map_err(|e| StoreError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: parsed,
            client,
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self, StoreError> {
        Self::new(&config.backend_url, config.connect_timeout_secs)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_connect() {
            StoreError::Connection(self.base_url.to_string())
        } else if e.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::HttpClient(e.to_string())
        }
    }

    async fn ensure_success(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl RecordStore for HttpRecordStore {
    async fn fetch_prescriptions(
        &self,
        patient_id: &str,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let url = self.endpoint(&["prescriptions", patient_id])?;
        tracing::debug!(%url, "Fetching prescriptions");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let response = Self::ensure_success(response).await?;

        let envelope: PrescriptionsEnvelope = response
            .json()
            .await
            .map_err(|e| StoreError::ResponseParsing(e.to_string()))?;

        Ok(envelope.prescriptions)
    }

    async fn reset_adherence(&self, patient_id: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&["prescriptions", patient_id, "reset-adherence"])?;
        tracing::debug!(%url, "Requesting adherence reset");

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn create_prescription(
        &self,
        patient_id: &str,
        record: &PrescriptionRecord,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&["prescriptions", patient_id])?;

        let response = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn update_prescription(
        &self,
        patient_id: &str,
        prescription_id: &str,
        record: &PrescriptionRecord,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&["prescriptions", patient_id, prescription_id])?;

        let response = self
            .client
            .put(url)
            .json(record)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn delete_prescription(
        &self,
        patient_id: &str,
        prescription_id: &str,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&["prescriptions", patient_id, prescription_id])?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
