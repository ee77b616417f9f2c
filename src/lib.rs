pub mod adherence;
pub mod backend_gate;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod ledger;
pub mod models;
pub mod record_store;
pub mod tracker;

use tracing_subscriber::EnvFilter;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::TrackerConfig;
pub use models::{Prescription, PrescriptionId, PrescriptionRecord, PrescriptionStatus};
pub use record_store::{HttpRecordStore, RecordStore, StoreError};
pub use tracker::{AdherenceSnapshot, AdherenceTracker, FetchReport, ResetOutcome, TrackerError};

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
