use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    api::{
        meterportal::{Api, FetchError},
        models::{CounterType, LatestReadings, RawReading},
    },
    prelude::*,
};

/// The remote calls the poller needs, pulled behind a seam so tests can run
/// against canned responses.
#[async_trait]
pub trait ReadingsSource: Sync {
    async fn latest_readings(&self, installation_id: &str) -> Result<LatestReadings, FetchError>;

    async fn historical_readings(
        &self,
        installation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawReading>, FetchError>;

    /// Lightweight reachability check.
    async fn probe(&self, installation_id: &str) -> Result<(), FetchError>;
}

#[async_trait]
impl ReadingsSource for Api {
    async fn latest_readings(&self, installation_id: &str) -> Result<LatestReadings, FetchError> {
        self.get_latest_readings(installation_id).await
    }

    async fn historical_readings(
        &self,
        installation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawReading>, FetchError> {
        self.get_historical_readings(installation_id, from, to).await
    }

    async fn probe(&self, installation_id: &str) -> Result<(), FetchError> {
        self.probe_addresses(installation_id).await
    }
}

/// Snapshot of one counter's newest value, pushed to observers whenever it
/// changes between polls.
#[derive(Clone, Debug, PartialEq)]
pub struct MeterUpdate {
    pub installation_id: String,
    pub counter_type: CounterType,
    pub unit: Option<String>,
    pub value: f64,
    pub timestamp: Option<String>,
}

type Observer = Box<dyn Fn(&MeterUpdate) + Send + Sync>;

/// Fan-out for latest-reading snapshots. Observers only hear about values
/// that actually changed.
#[derive(Default)]
pub struct Dispatcher {
    observers: Vec<Observer>,
}

impl Dispatcher {
    pub fn subscribe(&mut self, observer: impl Fn(&MeterUpdate) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn notify(&self, update: &MeterUpdate) {
        for observer in &self.observers {
            observer(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_dispatcher_reaches_every_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::default();
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(move |update: &MeterUpdate| {
                seen.lock().unwrap().push(update.value);
            });
        }
        dispatcher.notify(&MeterUpdate {
            installation_id: "i-1".to_string(),
            counter_type: CounterType::Heat,
            unit: None,
            value: 1.5,
            timestamp: None,
        });
        assert_eq!(*seen.lock().unwrap(), [1.5, 1.5]);
    }
}
