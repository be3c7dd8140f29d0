#[cfg(test)]
use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{core::meter_state::SeriesId, prelude::*};

/// One hour bucket of one series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticRecord {
    /// Start of the hour the record describes.
    pub start: DateTime<Utc>,

    /// Raw meter value at that hour.
    pub state: f64,

    /// Cumulative sum since the series began.
    pub sum: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub series_id: SeriesId,
    pub name: String,
    pub unit: Option<String>,
}

/// Long-term statistics storage. Imports are upserts keyed on the bucket
/// start, so replaying a window overwrites rather than duplicates.
#[async_trait]
pub trait StatisticsStore: Sync {
    async fn get_last(&self, series_id: &SeriesId) -> Result<Option<StatisticRecord>>;

    async fn import(&self, metadata: &SeriesMetadata, records: &[StatisticRecord]) -> Result;
}

/// Merge `new` into the sorted `records`, replacing records that share a
/// bucket start.
pub(crate) fn upsert(records: &mut Vec<StatisticRecord>, new: &[StatisticRecord]) {
    for record in new {
        match records.binary_search_by_key(&record.start, |existing| existing.start) {
            Ok(index) => records[index] = *record,
            Err(index) => records.insert(index, *record),
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore(Mutex<BTreeMap<SeriesId, Vec<StatisticRecord>>>);

#[cfg(test)]
#[async_trait]
impl StatisticsStore for MemoryStore {
    async fn get_last(&self, series_id: &SeriesId) -> Result<Option<StatisticRecord>> {
        let series = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(series.get(series_id).and_then(|records| records.last().copied()))
    }

    async fn import(&self, metadata: &SeriesMetadata, records: &[StatisticRecord]) -> Result {
        let mut series = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        upsert(series.entry(metadata.series_id.clone()).or_default(), records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn record(start: &str, sum: f64) -> StatisticRecord {
        StatisticRecord {
            start: DateTime::parse_from_rfc3339(start).unwrap().to_utc(),
            state: sum,
            sum,
        }
    }

    #[test]
    fn test_upsert_inserts_in_order() {
        let mut records = vec![record("2024-01-01T00:00:00Z", 1.0)];
        upsert(
            &mut records,
            &[record("2024-01-01T02:00:00Z", 3.0), record("2024-01-01T01:00:00Z", 2.0)],
        );
        let sums: Vec<f64> = records.iter().map(|record| record.sum).collect();
        assert_eq!(sums, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_upsert_replaces_matching_buckets() {
        let mut records = vec![record("2024-01-01T00:00:00Z", 1.0)];
        upsert(&mut records, &[record("2024-01-01T00:00:00Z", 9.0)]);
        assert_eq!(records.len(), 1);
        assert_abs_diff_eq!(records[0].sum, 9.0);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() -> Result {
        let store = MemoryStore::default();
        let metadata = SeriesMetadata {
            series_id: SeriesId::from_raw("i-1_heat_primary"),
            name: "Test".to_string(),
            unit: Some("kWh".to_string()),
        };
        assert!(store.get_last(&metadata.series_id).await?.is_none());
        store
            .import(
                &metadata,
                &[record("2024-01-01T00:00:00Z", 1.0), record("2024-01-01T01:00:00Z", 2.0)],
            )
            .await?;
        let last = store.get_last(&metadata.series_id).await?.unwrap();
        assert_abs_diff_eq!(last.sum, 2.0);
        Ok(())
    }
}
