use serde::Deserialize;
use serde_with::serde_as;

use crate::core::value::RawValue;

/// One physical metering point, as granted by the portal.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub installation_id: String,
    pub address: String,
    pub installation_type: String,
    pub meter_serial: String,

    #[serde(default)]
    pub nickname: Option<String>,

    #[serde(default)]
    pub utility_name: Option<String>,

    #[serde(default)]
    pub timezone: Option<String>,
}

impl Installation {
    /// Human-facing name: address and serial, with the optional nickname.
    pub fn device_name(&self) -> String {
        let mut name = format!("{} - {}", self.address, self.meter_serial);
        if let Some(nickname) = &self.nickname {
            name.push_str(&format!(" ({nickname})"));
        }
        name
    }
}

/// How a counter reports: an absolute lifetime total, or per-interval deltas.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingType {
    /// Absolute cumulative meter reading.
    #[default]
    #[serde(alias = "Counter")]
    Counter,

    /// Consumption within one reporting interval.
    #[serde(alias = "Consumption")]
    Consumption,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(from = "String")]
pub enum CounterType {
    ColdWater,
    HotWater,
    ElectricityFromGrid,
    ElectricityToGrid,
    Heat,
    BatteryDaysRemaining,
    Other(String),
}

impl From<String> for CounterType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ColdWater" => Self::ColdWater,
            "HotWater" => Self::HotWater,
            "ElectricityFromGrid" => Self::ElectricityFromGrid,
            "ElectricityToGrid" => Self::ElectricityToGrid,
            "Heat" => Self::Heat,
            "BatteryDaysRemaining" => Self::BatteryDaysRemaining,
            _ => Self::Other(raw),
        }
    }
}

impl CounterType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ColdWater => "ColdWater",
            Self::HotWater => "HotWater",
            Self::ElectricityFromGrid => "ElectricityFromGrid",
            Self::ElectricityToGrid => "ElectricityToGrid",
            Self::Heat => "Heat",
            Self::BatteryDaysRemaining => "BatteryDaysRemaining",
            Self::Other(raw) => raw,
        }
    }

    /// Counter types that feed the statistics pipeline.
    pub const fn is_consumable(&self) -> bool {
        matches!(
            self,
            Self::ColdWater
                | Self::HotWater
                | Self::ElectricityFromGrid
                | Self::ElectricityToGrid
                | Self::Heat
        )
    }
}

/// One measurable channel within an installation.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterCounter {
    pub meter_counter_id: String,
    pub counter_type: CounterType,

    #[serde(default)]
    pub reading_type: ReadingType,

    #[serde(default)]
    pub is_primary: bool,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub price_per_unit: Option<f64>,

    #[serde(default)]
    pub latest_value: Option<RawValue>,

    #[serde(default)]
    pub latest_timestamp: Option<String>,
}

/// Current snapshot of all counters of one installation.
#[must_use]
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestReadings {
    #[serde(default)]
    #[serde_as(as = "serde_with::VecSkipError<_>")]
    pub meter_counters: Vec<MeterCounter>,
}

impl LatestReadings {
    /// The installation's representative channel: the first primary counter,
    /// falling back to the first counter.
    pub fn primary_counter(&self) -> Option<&MeterCounter> {
        self.meter_counters
            .iter()
            .find(|counter| counter.is_primary)
            .or_else(|| self.meter_counters.first())
    }
}

/// One API-reported sample. Fetched per request, never persisted directly.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    pub meter_counter_id: String,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub value: Option<RawValue>,
}

#[must_use]
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct HistoricalReadings {
    #[serde(default)]
    #[serde_as(as = "serde_with::VecSkipError<_>")]
    pub readings: Vec<RawReading>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_deserialize_latest_readings_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "meterCounters": [
                    {
                        "meterCounterId": "c-1",
                        "counterType": "ElectricityFromGrid",
                        "readingType": "consumption",
                        "isPrimary": true,
                        "unit": "kWh",
                        "latestValue": "1234.5",
                        "latestTimestamp": "2024-01-01T00:05:00Z"
                    },
                    {
                        "meterCounterId": "c-2",
                        "counterType": "BatteryDaysRemaining",
                        "latestValue": 730
                    }
                ]
            }
        "#;
        let readings = serde_json::from_str::<LatestReadings>(RESPONSE)?;
        assert_eq!(readings.meter_counters.len(), 2);
        let primary = readings.primary_counter().unwrap();
        assert_eq!(primary.meter_counter_id, "c-1");
        assert_eq!(primary.counter_type, CounterType::ElectricityFromGrid);
        assert_eq!(primary.reading_type, ReadingType::Consumption);
        assert_eq!(readings.meter_counters[1].reading_type, ReadingType::Counter);
        assert!(!readings.meter_counters[1].counter_type.is_consumable());
        Ok(())
    }

    #[test]
    fn test_deserialize_skips_malformed_counters() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "meterCounters": [
                    {"counterType": "Heat"},
                    {"meterCounterId": "c-3", "counterType": "Heat"}
                ]
            }
        "#;
        let readings = serde_json::from_str::<LatestReadings>(RESPONSE)?;
        assert_eq!(readings.meter_counters.len(), 1);
        assert_eq!(readings.meter_counters[0].meter_counter_id, "c-3");
        Ok(())
    }

    #[test]
    fn test_deserialize_historical_readings_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "readings": [
                    {"meterCounterId": "c-1", "timestamp": "2024-01-01T01:00:00Z", "value": 0.42},
                    {"meterCounterId": "c-1", "timestamp": "2024-01-01T02:00:00+01:00", "value": "0.58"},
                    {"meterCounterId": "c-1"}
                ]
            }
        "#;
        let readings = serde_json::from_str::<HistoricalReadings>(RESPONSE)?;
        assert_eq!(readings.readings.len(), 3);
        assert!(readings.readings[2].value.is_none());
        Ok(())
    }

    #[test]
    fn test_unknown_counter_type_is_preserved() -> Result {
        let counter_type = CounterType::from("AcousticNoise".to_string());
        assert_eq!(counter_type, CounterType::Other("AcousticNoise".to_string()));
        assert_eq!(counter_type.as_str(), "AcousticNoise");
        Ok(())
    }

    #[test]
    fn test_device_name_with_nickname() {
        let installation = Installation {
            installation_id: "i-1".to_string(),
            address: "Nørregade 1".to_string(),
            installation_type: "Electricity".to_string(),
            meter_serial: "0042".to_string(),
            nickname: Some("Home".to_string()),
            utility_name: None,
            timezone: None,
        };
        assert_eq!(installation.device_name(), "Nørregade 1 - 0042 (Home)");
    }
}
