//! Command-line front end.
//!
//! Each invocation runs one command against a fresh tracker and prints
//! JSON. Dose checks carry over between invocations through the ledger
//! journal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use crate::clock::Clock;
use crate::config::{self, TrackerConfig};
use crate::db::LedgerJournal;
use crate::models::{PrescriptionRecord, PrescriptionStatus};
use crate::record_store::{HttpRecordStore, RecordStore};
use crate::tracker::{AdherenceTracker, FetchReport, TrackerError};

#[derive(Debug, Parser)]
#[command(name = "adherence-tracker")]
#[command(version = config::APP_VERSION)]
#[command(about = "Track daily medication doses and adherence", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Record service base URL (overrides ADHERENCE_BACKEND_URL)
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Patient whose prescriptions are tracked (overrides ADHERENCE_PATIENT_ID)
    #[arg(long, global = true)]
    pub patient_id: Option<String>,

    /// SQLite file holding dose checks (overrides ADHERENCE_LEDGER_DB)
    #[arg(long, global = true)]
    pub ledger_db: Option<PathBuf>,

    /// Keep dose checks in memory only
    #[arg(long, global = true, conflicts_with = "ledger_db")]
    pub no_journal: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Today's doses and adherence for every prescription
    Status {
        /// Only show prescriptions with this status: active, upcoming, completed
        #[arg(long)]
        status: Option<PrescriptionStatus>,
    },

    /// Fetch prescriptions and report records that failed validation
    List,

    /// Check or uncheck one of today's doses
    Toggle {
        prescription_id: String,
        /// Zero-based dose slot
        dose_index: usize,
    },

    /// Clear all dose checks and zero long-run adherence
    Reset,

    /// Create a prescription from a JSON record
    Add {
        /// Prescription JSON (snake_case or camelCase fields)
        record: String,
    },

    /// Replace a prescription with a JSON record
    Update {
        prescription_id: String,
        record: String,
    },

    /// Delete a prescription
    Remove { prescription_id: String },
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn resolve_config(&self, mut config: TrackerConfig) -> TrackerConfig {
        if let Some(url) = &self.backend_url {
            config.backend_url = url.clone();
        }
        if let Some(patient) = &self.patient_id {
            config.patient_id = patient.clone();
        }
        if let Some(path) = &self.ledger_db {
            config.ledger_db = Some(path.clone());
        }
        if self.no_journal {
            config.ledger_db = None;
        }
        config
    }
}

/// Build a tracker from `config` and run `command`. Errors come back as
/// display strings.
pub async fn run(command: Command, config: TrackerConfig) -> Result<serde_json::Value, String> {
    let store = HttpRecordStore::from_config(&config).map_err(|e| e.to_string())?;
    let mut tracker = AdherenceTracker::new(config.patient_id.clone(), store);

    if let Some(path) = &config.ledger_db {
        let journal = LedgerJournal::open(path).map_err(|e| e.to_string())?;
        tracker = tracker.with_journal(journal).map_err(|e| e.to_string())?;
    }

    tracing::info!(
        patient_id = %config.patient_id,
        backend = %config.backend_url,
        journal = config.ledger_db.is_some(),
        "Tracker ready"
    );

    execute(&tracker, command).await.map_err(|e| e.to_string())
}

/// Run one command against an existing tracker.
///
/// Commands that read prescriptions refresh them first. If the record
/// service is unreachable they carry on with the last known list and the
/// output gains a `"warning"` field. `reset` and `add` do not refresh
/// beforehand.
pub async fn execute<S, C>(
    tracker: &AdherenceTracker<S, C>,
    command: Command,
) -> Result<serde_json::Value, TrackerError>
where
    S: RecordStore,
    C: Clock,
{
    let (report, warning) = match command {
        Command::Reset | Command::Add { .. } => (None, None),
        _ => match tracker.list_prescriptions().await {
            Ok(report) => (Some(report), None),
            Err(e @ TrackerError::DataUnavailable(_)) => (None, Some(e.to_string())),
            Err(e) => return Err(e),
        },
    };

    let mut output = match command {
        Command::Status { status } => {
            let mut snapshot = tracker.snapshot()?;
            if let Some(wanted) = status {
                snapshot.prescriptions.retain(|p| p.status == wanted);
            }
            to_json(&snapshot)
        }
        Command::List => match report {
            Some(report) => to_json(&report),
            None => to_json(&FetchReport {
                prescriptions: tracker.cached_prescriptions()?,
                rejected: Vec::new(),
            }),
        },
        Command::Toggle {
            prescription_id,
            dose_index,
        } => {
            tracker.toggle_dose(&prescription_id, dose_index)?;
            json!({
                "prescription_id": prescription_id,
                "dose_index": dose_index,
                "checked": tracker.is_dose_checked(&prescription_id, dose_index)?,
                "session_adherence": tracker.calculate_actual_adherence(&prescription_id)?,
            })
        }
        Command::Reset => to_json(&tracker.reset_all().await?),
        Command::Add { record } => {
            let draft = parse_record(&record)?;
            to_json(&tracker.add_prescription(draft).await?)
        }
        Command::Update {
            prescription_id,
            record,
        } => {
            let draft = parse_record(&record)?;
            to_json(&tracker.update_prescription(&prescription_id, draft).await?)
        }
        Command::Remove { prescription_id } => {
            to_json(&tracker.remove_prescription(&prescription_id).await?)
        }
    };

    if let Some(warning) = warning {
        tracing::warn!(%warning, "Continuing with last known prescriptions");
        if let Some(obj) = output.as_object_mut() {
            obj.insert("warning".into(), json!(warning));
        }
    }

    Ok(output)
}

fn parse_record(raw: &str) -> Result<PrescriptionRecord, TrackerError> {
    serde_json::from_str(raw).map_err(|e| {
        TrackerError::InvalidPrescription(crate::models::InvalidPrescription {
            id: None,
            reason: crate::models::PrescriptionError::Malformed(e.to_string()),
        })
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}
