use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    core::meter_state::SeriesId,
    prelude::*,
    store::statistics::{SeriesMetadata, StatisticRecord, StatisticsStore, upsert},
};

/// Statistics persisted as one TOML document. A missing file is an empty
/// store, the whole document is rewritten on every import.
pub struct FileStore {
    path: PathBuf,
}

#[derive(Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    series: BTreeMap<String, Series>,
}

#[derive(Default, Serialize, Deserialize)]
struct Series {
    #[serde(default)]
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,

    #[serde(default)]
    records: Vec<StatisticRecord>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Document> {
        if !self.path.exists() {
            return Ok(Document::default());
        }
        read_toml(&self.path)
    }

    fn write(&self, document: &Document) -> Result {
        let contents = toml::to_string_pretty(document)
            .context("failed to serialize the statistics document")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write `{}`", self.path.display()))
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse `{}`", path.display()))
}

#[async_trait]
impl StatisticsStore for FileStore {
    async fn get_last(&self, series_id: &SeriesId) -> Result<Option<StatisticRecord>> {
        let document = self.read()?;
        Ok(document
            .series
            .get(series_id.as_str())
            .and_then(|series| series.records.last().copied()))
    }

    async fn import(&self, metadata: &SeriesMetadata, records: &[StatisticRecord]) -> Result {
        let mut document = self.read()?;
        let series = document.series.entry(metadata.series_id.to_string()).or_default();
        series.name = metadata.name.clone();
        series.unit = metadata.unit.clone();
        upsert(&mut series.records, records);
        self.write(&document)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::DateTime;

    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_an_empty_store() -> Result {
        let directory = std::env::temp_dir().join("grevling-test-missing-store");
        let store = FileStore::new(directory.join("nope.toml"));
        let series_id = SeriesId::from_raw("i-1_heat_primary");
        assert!(store.get_last(&series_id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_import_survives_a_reload() -> Result {
        let path = std::env::temp_dir().join("grevling-test-statistics.toml");
        let _ = fs::remove_file(&path);
        let metadata = SeriesMetadata {
            series_id: SeriesId::from_raw("i-1_heat_primary"),
            name: "Main street 1 - 123 (home)".to_string(),
            unit: Some("kWh".to_string()),
        };
        let record = StatisticRecord {
            start: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")?.to_utc(),
            state: 100.0,
            sum: 0.0,
        };

        FileStore::new(&path).import(&metadata, &[record]).await?;
        let reloaded = FileStore::new(&path).get_last(&metadata.series_id).await?.unwrap();
        assert_eq!(reloaded.start, record.start);
        assert_abs_diff_eq!(reloaded.state, 100.0);

        let _ = fs::remove_file(&path);
        Ok(())
    }
}
