use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "AdherenceTracker";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Patient record service the portal talks to when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/api";

/// Patient whose prescriptions are tracked when nothing is configured.
pub const DEFAULT_PATIENT_ID: &str = "patient_1";

/// Connect timeout for the record service. Requests themselves have no timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const ENV_BACKEND_URL: &str = "ADHERENCE_BACKEND_URL";
pub const ENV_PATIENT_ID: &str = "ADHERENCE_PATIENT_ID";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "ADHERENCE_CONNECT_TIMEOUT_SECS";
/// Path of the ledger journal, or `off` to keep dose checks in memory only.
pub const ENV_LEDGER_DB: &str = "ADHERENCE_LEDGER_DB";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "adherence_lib=info,adherence_tracker=info,warn"
}

/// Get the application data directory (`<local data dir>/AdherenceTracker/`).
///
/// `None` on platforms where no data directory can be determined.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_NAME))
}

/// Default location of the ledger journal database.
pub fn default_ledger_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("ledger.db"))
}

/// Runtime settings for the tracker and its record service client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub backend_url: String,
    pub patient_id: String,
    pub connect_timeout_secs: u64,
    /// `None` disables the on-disk journal.
    pub ledger_db: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            patient_id: DEFAULT_PATIENT_ID.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            ledger_db: default_ledger_path(),
        }
    }
}

impl TrackerConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unset or blank values fall back to the defaults; an unparseable
    /// timeout is logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BACKEND_URL) {
            config.backend_url = url.trim().to_string();
        }
        if let Some(patient) = get(ENV_PATIENT_ID) {
            config.patient_id = patient.trim().to_string();
        }
        if let Some(raw) = get(ENV_CONNECT_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.connect_timeout_secs = secs,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid {ENV_CONNECT_TIMEOUT_SECS}"
                ),
            }
        }
        if let Some(path) = get(ENV_LEDGER_DB) {
            config.ledger_db = if path.trim().eq_ignore_ascii_case("off") {
                None
            } else {
                Some(PathBuf::from(path.trim()))
            };
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_empty() {
        let config = TrackerConfig::from_lookup(|_| None);
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.patient_id, DEFAULT_PATIENT_ID);
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.ledger_db, default_ledger_path());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = TrackerConfig::from_lookup(lookup_from(&[
            (ENV_BACKEND_URL, "http://records.internal:9000/api"),
            (ENV_PATIENT_ID, " patient_42 "),
            (ENV_CONNECT_TIMEOUT_SECS, "3"),
            (ENV_LEDGER_DB, "/tmp/ledger.db"),
        ]));
        assert_eq!(config.backend_url, "http://records.internal:9000/api");
        assert_eq!(config.patient_id, "patient_42");
        assert_eq!(config.connect_timeout_secs, 3);
        assert_eq!(config.ledger_db, Some(PathBuf::from("/tmp/ledger.db")));
    }

    #[test]
    fn ledger_db_off_disables_journal() {
        let config = TrackerConfig::from_lookup(lookup_from(&[(ENV_LEDGER_DB, "OFF")]));
        assert!(config.ledger_db.is_none());
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        let config =
            TrackerConfig::from_lookup(lookup_from(&[(ENV_CONNECT_TIMEOUT_SECS, "soon")]));
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = TrackerConfig::from_lookup(lookup_from(&[(ENV_PATIENT_ID, "   ")]));
        assert_eq!(config.patient_id, DEFAULT_PATIENT_ID);
    }

    #[test]
    fn ledger_path_under_app_data() {
        if let (Some(path), Some(app)) = (default_ledger_path(), app_data_dir()) {
            assert!(path.starts_with(app));
            assert!(path.ends_with("ledger.db"));
        }
    }

    #[test]
    fn app_name_is_adherence_tracker() {
        assert_eq!(APP_NAME, "AdherenceTracker");
    }
}
