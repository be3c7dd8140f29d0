use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    api::{
        meterportal::FetchError,
        models::{Installation, LatestReadings, MeterCounter, ReadingType},
    },
    core::{
        availability::Availability,
        meter_state::SeriesId,
        reconcile::Reconciler,
        source::{Dispatcher, MeterUpdate, ReadingsSource},
    },
    prelude::*,
    store::{
        state::MeterStates,
        statistics::{SeriesMetadata, StatisticsStore},
    },
};

/// Forward window when the series already has stored history.
const INCREMENTAL_WINDOW_DAYS: i64 = 7;

/// Forward window for a series seen for the very first time.
const INITIAL_WINDOW_DAYS: i64 = 30;

/// What one scheduled trigger amounted to.
#[derive(Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// The previous successful update is too recent.
    Throttled,

    /// The installation is unreachable, waiting for a probe to succeed.
    Unavailable,

    /// HTTP 429, the cycle is skipped without touching any state.
    RateLimited,

    /// Nothing was imported and at least one counter failed.
    Failed,

    Completed {
        n_records: usize,
    },
}

enum StatisticsOutcome {
    Imported(usize),
    RateLimited,
    Unavailable,
    Failed,
}

/// Drives the fetch-reconcile-import loop for one installation.
///
/// All remote failures are absorbed here: a cycle either completes or reports
/// why it could not, and the next trigger starts from persisted state.
#[derive(bon::Builder)]
pub struct Poller<'a, S> {
    source: &'a S,
    installation: &'a Installation,
    polling_interval: TimeDelta,

    #[builder(default)]
    pub availability: Availability,

    last_successful_update: Option<DateTime<Utc>>,

    #[builder(default)]
    last_values: HashMap<String, f64>,

    #[builder(default)]
    dispatcher: Dispatcher,
}

impl<S: ReadingsSource> Poller<'_, S> {
    pub fn subscribe(&mut self, observer: impl Fn(&MeterUpdate) + Send + Sync + 'static) {
        self.dispatcher.subscribe(observer);
    }

    #[instrument(skip_all, fields(installation_id = self.installation.installation_id.as_str()))]
    pub async fn update_cycle(
        &mut self,
        now: DateTime<Utc>,
        store: &impl StatisticsStore,
        states: &mut MeterStates,
    ) -> CycleOutcome {
        if self
            .last_successful_update
            .is_some_and(|last_update| now - last_update < self.polling_interval)
        {
            debug!("Throttled");
            return CycleOutcome::Throttled;
        }
        self.cycle(now, store, states).await
    }

    /// Manually requested update, ignores the throttle.
    #[instrument(skip_all, fields(installation_id = self.installation.installation_id.as_str()))]
    pub async fn refresh(
        &mut self,
        now: DateTime<Utc>,
        store: &impl StatisticsStore,
        states: &mut MeterStates,
    ) -> CycleOutcome {
        self.cycle(now, store, states).await
    }

    async fn cycle(
        &mut self,
        now: DateTime<Utc>,
        store: &impl StatisticsStore,
        states: &mut MeterStates,
    ) -> CycleOutcome {
        if !self.availability.is_available() {
            if !self.availability.is_probe_due(now) {
                return CycleOutcome::Unavailable;
            }
            match self.source.probe(&self.installation.installation_id).await {
                Ok(()) => {
                    info!("The installation is reachable again");
                    self.availability.mark_success();
                }
                Err(error) => {
                    self.note_unavailable(now, &error);
                    return CycleOutcome::Unavailable;
                }
            }
        }
        self.poll(now, store, states).await
    }

    async fn poll(
        &mut self,
        now: DateTime<Utc>,
        store: &impl StatisticsStore,
        states: &mut MeterStates,
    ) -> CycleOutcome {
        let latest = match self.source.latest_readings(&self.installation.installation_id).await {
            Ok(latest) => latest,
            Err(FetchError::RateLimited) => {
                warn!("Rate limited, skipping the cycle");
                return CycleOutcome::RateLimited;
            }
            Err(error @ FetchError::InstallationUnavailable(_)) => {
                self.note_unavailable(now, &error);
                return CycleOutcome::Unavailable;
            }
            Err(error) => {
                error!(%error, "Failed to fetch the latest readings");
                return CycleOutcome::Failed;
            }
        };
        self.availability.mark_success();
        self.last_successful_update = Some(now);
        self.notify_changed(&latest);

        let mut n_records = 0;
        let mut any_failed = false;
        for counter in
            latest.meter_counters.iter().filter(|counter| counter.counter_type.is_consumable())
        {
            match self.update_statistics(now, counter, store, states).await {
                StatisticsOutcome::Imported(n_imported) => {
                    n_records += n_imported;
                }
                StatisticsOutcome::RateLimited => {
                    warn!("Rate limited, skipping the rest of the cycle");
                    return CycleOutcome::RateLimited;
                }
                StatisticsOutcome::Unavailable => {
                    return CycleOutcome::Unavailable;
                }
                StatisticsOutcome::Failed => {
                    any_failed = true;
                }
            }
        }
        if any_failed && n_records == 0 {
            return CycleOutcome::Failed;
        }
        info!(n_records, "Completed");
        CycleOutcome::Completed { n_records }
    }

    /// Fetch, reconcile, and import one counter's recent history.
    #[instrument(skip_all, fields(meter_counter_id = counter.meter_counter_id.as_str()))]
    async fn update_statistics(
        &mut self,
        now: DateTime<Utc>,
        counter: &MeterCounter,
        store: &impl StatisticsStore,
        states: &mut MeterStates,
    ) -> StatisticsOutcome {
        let series_id = SeriesId::new(&self.installation.installation_id, counter);
        let last_stored = match store.get_last(&series_id).await {
            Ok(last_stored) => last_stored,
            Err(error) => {
                error!(error = format!("{error:#}"), "Failed to query the store");
                return StatisticsOutcome::Failed;
            }
        };
        let has_stored_history = last_stored.is_some();

        let mut prior = states.get(&series_id);
        if counter.reading_type == ReadingType::Consumption && prior.cumulative_sum == 0.0 {
            if let Some(last_stored) = last_stored {
                // Lost or fresh local state, pick the sum up where the store
                // left off.
                prior.cumulative_sum = last_stored.sum;
            }
        }
        let window_days = if has_stored_history {
            INCREMENTAL_WINDOW_DAYS
        } else {
            // An empty store means the series starts over, including buckets
            // an old watermark would have excluded.
            prior.last_processed_at = None;
            INITIAL_WINDOW_DAYS
        };

        let from = (now - TimeDelta::days(window_days)).date_naive();
        let readings = match self
            .source
            .historical_readings(&self.installation.installation_id, from, now.date_naive())
            .await
        {
            Ok(readings) => readings,
            Err(FetchError::RateLimited) => return StatisticsOutcome::RateLimited,
            Err(error @ FetchError::InstallationUnavailable(_)) => {
                self.note_unavailable(now, &error);
                return StatisticsOutcome::Unavailable;
            }
            Err(error) => {
                error!(%error, "Failed to fetch the historical readings");
                return StatisticsOutcome::Failed;
            }
        };
        let readings: Vec<_> = readings
            .into_iter()
            .filter(|reading| reading.meter_counter_id == counter.meter_counter_id)
            .collect();

        let reconciliation = Reconciler::builder()
            .reading_type(counter.reading_type)
            .readings(&readings)
            .prior(&prior)
            .has_stored_history(has_stored_history)
            .build()
            .run();
        if reconciliation.records.is_empty() {
            debug!("Nothing new");
            return StatisticsOutcome::Imported(0);
        }

        let metadata = SeriesMetadata {
            series_id: series_id.clone(),
            name: self.installation.device_name(),
            unit: counter.unit.clone(),
        };
        if let Err(error) = store.import(&metadata, &reconciliation.records).await {
            error!(error = format!("{error:#}"), "Failed to import the records");
            return StatisticsOutcome::Failed;
        }

        // The watermark only moves once the import is known to have stuck.
        states.insert(&series_id, reconciliation.state);
        states.persist();
        info!(n_records = reconciliation.records.len(), "Imported");
        StatisticsOutcome::Imported(reconciliation.records.len())
    }

    /// Push latest-value snapshots to the observers, skipping unchanged ones.
    fn notify_changed(&mut self, latest: &LatestReadings) {
        for counter in &latest.meter_counters {
            let Some(raw_value) = &counter.latest_value else {
                continue;
            };
            let mut value = match raw_value.parse() {
                Ok(value) => value,
                Err(error) => {
                    debug!(%error, "Skipped an unparseable latest value");
                    continue;
                }
            };
            if value < 0.0 {
                warn!(value, meter_counter_id = counter.meter_counter_id, "Negative reading");
                value = value.abs();
            }
            let previous = self.last_values.insert(counter.meter_counter_id.clone(), value);
            if previous != Some(value) {
                self.dispatcher.notify(&MeterUpdate {
                    installation_id: self.installation.installation_id.clone(),
                    counter_type: counter.counter_type.clone(),
                    unit: counter.unit.clone(),
                    value,
                    timestamp: counter.latest_timestamp.clone(),
                });
            }
        }
    }

    fn note_unavailable(&mut self, now: DateTime<Utc>, error: &FetchError) {
        let delay = self.availability.mark_unavailable(now);
        if self.availability.is_given_up(now) {
            debug!(%error, ?delay, "The installation is still unreachable");
        } else {
            warn!(%error, ?delay, "The installation is unreachable");
        }
    }
}
