use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use itertools::Itertools;

use crate::{
    api::models::{RawReading, ReadingType},
    core::meter_state::VirtualMeterState,
    prelude::*,
    store::statistics::StatisticRecord,
};

/// Output of one reconciliation pass.
#[must_use]
pub struct Reconciliation {
    pub records: Vec<StatisticRecord>,
    pub state: VirtualMeterState,
}

/// Turns one batch of raw readings into hour-bucketed statistic records with
/// cumulative-sum semantics.
///
/// The remote API has no cursor, so callers deliberately over-fetch
/// overlapping windows. Re-running over the same or an overlapping batch must
/// therefore never double-count: every emitted bucket advances the watermark,
/// and anything at or behind the watermark is skipped.
#[derive(bon::Builder)]
pub struct Reconciler<'a> {
    reading_type: ReadingType,
    readings: &'a [RawReading],
    prior: &'a VirtualMeterState,

    /// Whether the statistics store already holds records for this series.
    /// The baseline is only established on the very first import; afterwards
    /// counter values go in as-is.
    #[builder(default)]
    has_stored_history: bool,
}

impl Reconciler<'_> {
    pub fn run(self) -> Reconciliation {
        let mut state = self.prior.clone();
        let mut records: Vec<StatisticRecord> = Vec::new();
        let mut sum = self.prior.cumulative_sum;
        let mut baseline = if self.has_stored_history { None } else { self.prior.baseline };

        let samples = self
            .readings
            .iter()
            .filter_map(|reading| {
                let timestamp = parse_timestamp(reading.timestamp.as_deref()?)?;
                match reading.value.as_ref()?.parse() {
                    Ok(value) => Some((timestamp, value)),
                    Err(error) => {
                        debug!(%error, "Skipped an unparseable reading");
                        None
                    }
                }
            })
            .sorted_by_key(|(timestamp, _)| *timestamp);

        for (timestamp, value) in samples {
            let bucket = self.bucket_of(timestamp);
            if state.last_processed_at.is_some_and(|watermark| bucket <= watermark) {
                continue;
            }
            let record = match self.reading_type {
                ReadingType::Consumption => {
                    // Only positive deltas grow the virtual meter, but the
                    // reading is still consumed and advances the watermark.
                    if value > 0.0 {
                        sum += value;
                    }
                    StatisticRecord { start: bucket, state: value, sum }
                }
                ReadingType::Counter => {
                    let sum = if self.has_stored_history {
                        value
                    } else {
                        value - *baseline.get_or_insert(value)
                    };
                    StatisticRecord { start: bucket, state: value, sum }
                }
            };
            state.last_processed_at = Some(record.start);
            records.push(record);
        }

        if records.is_empty() {
            return Reconciliation { records, state: self.prior.clone() };
        }
        state.cumulative_sum = sum;
        state.baseline = baseline.or(self.prior.baseline);
        state.initialized = true;
        Reconciliation { records, state }
    }

    /// Hour bucket of a reading. Counter-type timestamps mark the *end* of
    /// the measured interval, so their bucket is the preceding hour:
    /// a reading taken at 00:05 describes the meter at the end of the
    /// 23:00–00:00 hour.
    fn bucket_of(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let bucket = truncate_to_hour(timestamp);
        match self.reading_type {
            ReadingType::Counter => bucket - TimeDelta::hours(1),
            ReadingType::Consumption => bucket,
        }
    }
}

/// Parse an ISO-8601 timestamp with either a `Z` suffix or an explicit
/// offset, normalized to UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(timestamp) => Some(timestamp.to_utc()),
        Err(error) => {
            debug!(raw, %error, "Skipped a reading with a malformed timestamp");
            None
        }
    }
}

fn truncate_to_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.duration_trunc(TimeDelta::hours(1)).unwrap_or(timestamp)
}
