use std::{fs, path::{Path, PathBuf}};

use chrono::TimeDelta;
use serde::Deserialize;

use crate::{api::models::Installation, prelude::*};

pub const DEFAULT_BASE_URL: &str = "https://api.gateway.meterportal.eu/v1/smarthome";

const MIN_POLLING_INTERVAL_MINUTES: i64 = 15;
const MAX_POLLING_INTERVAL_MINUTES: i64 = 120;
const DEFAULT_POLLING_INTERVAL_MINUTES: i64 = 30;

#[derive(Deserialize)]
pub struct Config {
    pub api_key: String,

    /// Account e-mail, informational only.
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_polling_interval_minutes")]
    polling_interval_minutes: i64,

    #[serde(default = "default_statistics_path")]
    pub statistics_path: PathBuf,

    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    pub installations: Vec<Installation>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_polling_interval_minutes() -> i64 {
    DEFAULT_POLLING_INTERVAL_MINUTES
}

fn default_statistics_path() -> PathBuf {
    PathBuf::from("statistics.toml")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state.toml")
}

impl Config {
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse `{}`", path.display()))
    }

    /// Configured polling interval, clamped to the supported range.
    pub fn polling_interval(&self) -> TimeDelta {
        TimeDelta::minutes(
            self.polling_interval_minutes
                .clamp(MIN_POLLING_INTERVAL_MINUTES, MAX_POLLING_INTERVAL_MINUTES),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_ok() -> Result {
        // language=TOML
        const CONFIG: &str = r#"
            api_key = "secret"

            [[installations]]
            installationId = "i-1"
            address = "Nørregade 1"
            installationType = "Heat"
            meterSerial = "0042"
        "#;
        let config: Config = toml::from_str(CONFIG)?;
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.polling_interval().num_minutes(), 30);
        assert_eq!(config.installations.len(), 1);
        assert_eq!(config.installations[0].installation_id, "i-1");
        Ok(())
    }

    #[test]
    fn test_polling_interval_is_clamped() -> Result {
        // language=TOML
        const CONFIG: &str = r#"
            api_key = "secret"
            polling_interval_minutes = 5
            installations = []
        "#;
        let config: Config = toml::from_str(CONFIG)?;
        assert_eq!(config.polling_interval().num_minutes(), 15);
        Ok(())
    }
}
