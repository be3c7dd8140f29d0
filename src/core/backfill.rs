use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    api::{
        meterportal::{FetchError, MAX_RANGE_DAYS},
        models::{Installation, MeterCounter},
    },
    core::{
        meter_state::{SeriesId, VirtualMeterState},
        reconcile::Reconciler,
        source::ReadingsSource,
    },
    prelude::*,
    store::statistics::{SeriesMetadata, StatisticsStore},
};

/// Days per historical request, kept under the remote's range cap.
const CHUNK_DAYS: i64 = MAX_RANGE_DAYS - 1;

/// One-shot import of an arbitrary past range for one counter, chunked to fit
/// the remote's range cap.
///
/// Runs on a fresh accumulator and never touches the live polling watermark:
/// imports are upserts, so overlapping an already-stored range is harmless.
#[derive(bon::Builder)]
pub struct Backfill<'a, S, T> {
    source: &'a S,
    store: &'a T,
    installation: &'a Installation,
    counter: &'a MeterCounter,

    /// Start of the range, in whole days before now.
    from_days_ago: u32,

    /// End of the range, in whole days before now. Zero means today.
    #[builder(default)]
    to_days_ago: u32,
}

impl<S: ReadingsSource, T: StatisticsStore> Backfill<'_, S, T> {
    #[instrument(
        skip_all,
        fields(
            installation_id = self.installation.installation_id.as_str(),
            meter_counter_id = self.counter.meter_counter_id.as_str(),
        ),
    )]
    pub async fn run(self, now: DateTime<Utc>) -> Result<usize> {
        ensure!(
            self.from_days_ago > self.to_days_ago,
            "the range start must lie before its end",
        );
        let from = (now - TimeDelta::days(i64::from(self.from_days_ago))).date_naive();
        let to = (now - TimeDelta::days(i64::from(self.to_days_ago))).date_naive();

        let series_id = SeriesId::new(&self.installation.installation_id, self.counter);
        let metadata = SeriesMetadata {
            series_id,
            name: self.installation.device_name(),
            unit: self.counter.unit.clone(),
        };

        let mut state = VirtualMeterState::default();
        let mut n_records = 0;
        let mut chunk_start = from;
        while chunk_start <= to {
            let chunk_end = (chunk_start + TimeDelta::days(CHUNK_DAYS - 1)).min(to);
            let readings = match self
                .source
                .historical_readings(&self.installation.installation_id, chunk_start, chunk_end)
                .await
            {
                Ok(readings) => readings,
                Err(FetchError::RateLimited) => {
                    warn!(%chunk_start, "Rate limited, stopping early");
                    break;
                }
                Err(error) => {
                    return Err(error).context("failed to fetch a backfill window");
                }
            };
            let readings: Vec<_> = readings
                .into_iter()
                .filter(|reading| reading.meter_counter_id == self.counter.meter_counter_id)
                .collect();

            let reconciliation = Reconciler::builder()
                .reading_type(self.counter.reading_type)
                .readings(&readings)
                .prior(&state)
                .build()
                .run();
            if !reconciliation.records.is_empty() {
                self.store.import(&metadata, &reconciliation.records).await?;
                n_records += reconciliation.records.len();
            }
            // The baseline and sum carry over into the next chunk.
            state = reconciliation.state;
            chunk_start = chunk_end + TimeDelta::days(1);
        }
        info!(n_records, %from, %to, "Backfilled");
        Ok(n_records)
    }
}
