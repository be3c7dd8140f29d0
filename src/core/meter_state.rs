use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::models::MeterCounter;

/// Identifies one statistic series: one channel of one installation.
#[derive(
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub struct SeriesId(String);

impl SeriesId {
    pub fn new(installation_id: &str, counter: &MeterCounter) -> Self {
        let counter_type = counter.counter_type.as_str().to_lowercase();
        let suffix = if counter.is_primary { "primary" } else { "secondary" };
        Self(format!("{installation_id}_{counter_type}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

/// Durable per-series accumulator. Restored on startup, mutated only by the
/// reconciler, persisted after every successful import.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMeterState {
    /// Virtual cumulative meter reading (consumption-type series).
    #[serde(default)]
    pub cumulative_sum: f64,

    /// Watermark: latest hour bucket already stored. Readings at or before it
    /// are skipped on the next pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<DateTime<Utc>>,

    /// First absolute reading ever seen for a counter-type series, subtracted
    /// from the stored sums so the series starts near zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,

    /// Whether any reconciliation has ever emitted records for this series.
    #[serde(default)]
    pub initialized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{CounterType, ReadingType};

    fn counter(is_primary: bool) -> MeterCounter {
        MeterCounter {
            meter_counter_id: "c-1".to_string(),
            counter_type: CounterType::ElectricityFromGrid,
            reading_type: ReadingType::Counter,
            is_primary,
            unit: None,
            price_per_unit: None,
            latest_value: None,
            latest_timestamp: None,
        }
    }

    #[test]
    fn test_series_id_format() {
        assert_eq!(
            SeriesId::new("i-1", &counter(true)).as_str(),
            "i-1_electricityfromgrid_primary",
        );
        assert_eq!(
            SeriesId::new("i-1", &counter(false)).as_str(),
            "i-1_electricityfromgrid_secondary",
        );
    }
}
