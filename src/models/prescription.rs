//! Prescription records: the validated in-memory type, the wire record
//! exchanged with the patient record service, and load-time validation.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use super::enums::PrescriptionStatus;

/// Pill count at or below which a prescription is flagged as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// Most doses a prescription may schedule in one day.
pub const MAX_DAILY_DOSES: u32 = 24;

// ═══════════════════════════════════════════
// Identifier
// ═══════════════════════════════════════════

/// Opaque prescription identifier, stable for the lifetime of the course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrescriptionId(String);

impl PrescriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrescriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrescriptionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PrescriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════
// Validated prescription
// ═══════════════════════════════════════════

/// One active medication course, as tracked by the adherence tracker.
///
/// Only constructed through [`PrescriptionRecord::into_prescription`], so
/// `daily_doses >= 1` and `pills_remaining <= total_pills` always hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub status: PrescriptionStatus,
    pub refill_date: NaiveDate,
    /// Long-run adherence percentage (0–100) maintained by the record service.
    pub adherence: f64,
    pub pills_remaining: u32,
    pub total_pills: u32,
    pub daily_doses: u32,
}

impl Prescription {
    /// Wire form of this prescription, used for update requests.
    pub fn to_record(&self) -> PrescriptionRecord {
        PrescriptionRecord {
            id: Some(self.id.as_str().to_string()),
            medication: self.medication.clone(),
            dosage: self.dosage.clone(),
            frequency: self.frequency.clone(),
            status: self.status,
            refill_date: self.refill_date,
            adherence: self.adherence,
            pills_remaining: self.pills_remaining,
            total_pills: self.total_pills,
            daily_doses: self.daily_doses,
        }
    }
}

// ═══════════════════════════════════════════
// Wire record
// ═══════════════════════════════════════════

/// Prescription as exchanged with the record service.
///
/// Serialized with snake_case field names. The camelCase names used by
/// older backends are accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub status: PrescriptionStatus,
    #[serde(alias = "refillDate", deserialize_with = "deserialize_calendar_date")]
    pub refill_date: NaiveDate,
    #[serde(default)]
    pub adherence: f64,
    #[serde(alias = "pillsRemaining")]
    pub pills_remaining: u32,
    #[serde(alias = "totalPills")]
    pub total_pills: u32,
    #[serde(alias = "dailyDoses")]
    pub daily_doses: u32,
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (truncated to its date).
fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_calendar_date(&raw).map_err(serde::de::Error::custom)
}

fn parse_calendar_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.date_naive())
        .map_err(|_| format!("invalid calendar date: {trimmed}"))
}

/// Why a single prescription record was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionError {
    #[error("daily_doses must be at least 1")]
    ZeroDailyDoses,

    #[error("daily_doses {0} exceeds the limit of {max}", max = MAX_DAILY_DOSES)]
    TooManyDailyDoses(u32),

    #[error("pills_remaining ({remaining}) exceeds total_pills ({total})")]
    PillsExceedTotal { remaining: u32, total: u32 },

    #[error("medication name is empty")]
    EmptyMedication,

    #[error("adherence {0} is outside 0..=100")]
    AdherenceOutOfRange(f64),

    #[error("record has no id")]
    MissingId,

    #[error("id already used by another record in the same payload")]
    DuplicateId,

    #[error("invalid value for {field}: {value}")]
    UnknownEnum { field: &'static str, value: String },

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// A record excluded from the active list, with the id it carried (if any).
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("prescription {} rejected: {reason}", .id.as_deref().unwrap_or("<no id>"))]
pub struct InvalidPrescription {
    pub id: Option<String>,
    pub reason: PrescriptionError,
}

impl PrescriptionRecord {
    /// Check the record invariants that do not depend on the id.
    pub fn check_invariants(&self) -> Result<(), PrescriptionError> {
        if self.medication.trim().is_empty() {
            return Err(PrescriptionError::EmptyMedication);
        }
        if self.daily_doses < 1 {
            return Err(PrescriptionError::ZeroDailyDoses);
        }
        if self.daily_doses > MAX_DAILY_DOSES {
            return Err(PrescriptionError::TooManyDailyDoses(self.daily_doses));
        }
        if self.pills_remaining > self.total_pills {
            return Err(PrescriptionError::PillsExceedTotal {
                remaining: self.pills_remaining,
                total: self.total_pills,
            });
        }
        if !self.adherence.is_finite() || !(0.0..=100.0).contains(&self.adherence) {
            return Err(PrescriptionError::AdherenceOutOfRange(self.adherence));
        }
        Ok(())
    }

    /// Validate the record and turn it into a tracked [`Prescription`].
    pub fn into_prescription(self) -> Result<Prescription, InvalidPrescription> {
        let reject = |id: Option<String>, reason| InvalidPrescription { id, reason };

        if let Err(reason) = self.check_invariants() {
            return Err(reject(self.id, reason));
        }
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => PrescriptionId::new(id),
            other => return Err(reject(other, PrescriptionError::MissingId)),
        };

        Ok(Prescription {
            id,
            medication: self.medication,
            dosage: self.dosage,
            frequency: self.frequency,
            status: self.status,
            refill_date: self.refill_date,
            adherence: self.adherence,
            pills_remaining: self.pills_remaining,
            total_pills: self.total_pills,
            daily_doses: self.daily_doses,
        })
    }
}

/// Decode and validate one raw record from a fetch payload.
///
/// The id is read leniently first so that a record failing to decode can
/// still be reported by id.
pub fn decode_prescription(value: serde_json::Value) -> Result<Prescription, InvalidPrescription> {
    let reported_id = match value.get("id") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let record: PrescriptionRecord =
        serde_json::from_value(value).map_err(|e| InvalidPrescription {
            id: reported_id,
            reason: PrescriptionError::Malformed(e.to_string()),
        })?;

    record.into_prescription()
}
