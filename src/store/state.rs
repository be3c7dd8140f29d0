use std::{collections::BTreeMap, fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    core::meter_state::{SeriesId, VirtualMeterState},
    prelude::*,
};

/// How far back history has been fetched on first contact.
const INITIAL_HISTORY_DAYS: u32 = 30;

/// Durable reconciliation state for every series, plus the backfill
/// watermark. Kept small and rewritten wholesale.
pub struct MeterStates {
    path: PathBuf,
    document: Document,
}

#[derive(Serialize, Deserialize)]
struct Document {
    /// How many days back statistics have ever been fetched. Each completed
    /// backfill pushes it further.
    #[serde(default = "default_history_fetched_days")]
    history_fetched_days: u32,

    #[serde(default)]
    series: BTreeMap<String, VirtualMeterState>,
}

const fn default_history_fetched_days() -> u32 {
    INITIAL_HISTORY_DAYS
}

impl Default for Document {
    fn default() -> Self {
        Self { history_fetched_days: INITIAL_HISTORY_DAYS, series: BTreeMap::new() }
    }
}

impl MeterStates {
    /// Restore the state from the path. An unreadable or corrupt file logs
    /// and starts fresh: the reconciler recovers by re-fetching.
    pub fn read_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = if path.exists() {
            match fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|contents| toml::from_str(&contents).map_err(Error::from))
            {
                Ok(document) => document,
                Err(error) => {
                    error!(error = format!("{error:#}"), "Failed to restore the meter states");
                    Document::default()
                }
            }
        } else {
            Document::default()
        };
        Self { path, document }
    }

    pub fn get(&self, series_id: &SeriesId) -> VirtualMeterState {
        self.document.series.get(series_id.as_str()).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, series_id: &SeriesId, state: VirtualMeterState) {
        self.document.series.insert(series_id.to_string(), state);
    }

    pub const fn history_fetched_days(&self) -> u32 {
        self.document.history_fetched_days
    }

    pub fn extend_history_fetched_days(&mut self, days: u32) {
        self.document.history_fetched_days =
            self.document.history_fetched_days.saturating_add(days);
    }

    /// Best-effort write, a failure only logs. The state is rebuilt from the
    /// store on the next run if needed.
    pub fn persist(&self) {
        let result = toml::to_string_pretty(&self.document)
            .map_err(Error::from)
            .and_then(|contents| fs::write(&self.path, contents).map_err(Error::from));
        if let Err(error) = result {
            error!(error = format!("{error:#}"), "Failed to persist the meter states");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    #[test]
    fn test_missing_file_starts_fresh() {
        let states =
            MeterStates::read_from(std::env::temp_dir().join("grevling-test-no-state.toml"));
        assert_eq!(states.history_fetched_days(), 30);
        let state = states.get(&SeriesId::from_raw("i-1_heat_primary"));
        assert_eq!(state, VirtualMeterState::default());
    }

    #[test]
    fn test_round_trip() {
        let path = std::env::temp_dir().join("grevling-test-state.toml");
        let _ = fs::remove_file(&path);
        let series_id = SeriesId::from_raw("i-1_heat_primary");

        let mut states = MeterStates::read_from(&path);
        states.insert(
            &series_id,
            VirtualMeterState {
                cumulative_sum: 12.5,
                last_processed_at: Some(
                    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().to_utc(),
                ),
                baseline: Some(100.0),
                initialized: true,
            },
        );
        states.extend_history_fetched_days(30);
        states.persist();

        let reloaded = MeterStates::read_from(&path);
        assert_eq!(reloaded.history_fetched_days(), 60);
        assert_eq!(reloaded.get(&series_id), states.get(&series_id));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let path = std::env::temp_dir().join("grevling-test-corrupt-state.toml");
        fs::write(&path, "not [ valid { toml").unwrap();
        let states = MeterStates::read_from(&path);
        assert_eq!(states.history_fetched_days(), 30);
        let _ = fs::remove_file(&path);
    }
}
