use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;

use super::{
    client,
    models::{HistoricalReadings, LatestReadings, RawReading},
};
use crate::prelude::*;

/// The remote caps a historical request at roughly this many days,
/// so callers chunk larger windows.
pub const MAX_RANGE_DAYS: i64 = 31;

const LATEST_TIMEOUT: Duration = Duration::from_secs(30);
const HISTORICAL_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the remote can do to a single request.
///
/// There is deliberately no retry here: a failed cycle goes quiescent and the
/// next scheduled trigger tries again.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum FetchError {
    /// HTTP 429. Transient: skip the cycle, retry on the next trigger.
    #[display("rate limited")]
    RateLimited,

    /// HTTP 403/404: the installation is gone or the key lost access.
    /// Feeds the availability tracker.
    #[display("installation not accessible (HTTP {_0})")]
    InstallationUnavailable(#[error(not(source))] StatusCode),

    /// Any other non-2xx status.
    #[display("request failed (HTTP {_0})")]
    RequestFailed(#[error(not(source))] StatusCode),

    #[display("request timed out")]
    TimedOut,

    #[display("connection failed: {_0}")]
    ConnectionFailed(#[error(source)] reqwest::Error),

    #[display("failed to decode the response: {_0}")]
    MalformedResponse(#[error(source)] reqwest::Error),
}

impl FetchError {
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::TimedOut
        } else if error.is_decode() {
            Self::MalformedResponse(error)
        } else {
            Self::ConnectionFailed(error)
        }
    }
}

pub struct Api {
    client: Client,
    base_url: String,
}

impl Api {
    pub fn try_new(api_key: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            client: client::try_new(api_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Current snapshot of all counters of the installation.
    #[instrument(skip_all, fields(installation_id = installation_id))]
    pub async fn get_latest_readings(
        &self,
        installation_id: &str,
    ) -> Result<LatestReadings, FetchError> {
        let url = format!("{}/installations/{installation_id}/readings/latest", self.base_url);
        let response = self
            .client
            .get(url)
            .timeout(LATEST_TIMEOUT)
            .send()
            .await
            .map_err(FetchError::from_transport)?;
        let readings: LatestReadings =
            check_status(response)?.json().await.map_err(FetchError::from_transport)?;
        debug!(n_counters = readings.meter_counters.len(), "Fetched");
        Ok(readings)
    }

    /// Readings of *all* counters of the installation within the inclusive
    /// day range. Filtering by counter is up to the caller.
    #[instrument(skip_all, fields(installation_id = installation_id, from = %from, to = %to))]
    pub async fn get_historical_readings(
        &self,
        installation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawReading>, FetchError> {
        #[derive(Serialize)]
        struct HistoricalRequest {
            from: String,
            to: String,
        }

        let url = format!("{}/installations/{installation_id}/readings/historical", self.base_url);
        let body = HistoricalRequest {
            from: format!("{from}T00:00:00Z"),
            to: format!("{to}T23:59:59Z"),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(HISTORICAL_TIMEOUT)
            .send()
            .await
            .map_err(FetchError::from_transport)?;
        let readings: HistoricalReadings =
            check_status(response)?.json().await.map_err(FetchError::from_transport)?;
        debug!(n_readings = readings.readings.len(), "Fetched");
        Ok(readings.readings)
    }

    /// Lightweight reachability probe: 200 means the installation is back.
    #[instrument(skip_all, fields(installation_id = installation_id))]
    pub async fn probe_addresses(&self, installation_id: &str) -> Result<(), FetchError> {
        let url = format!("{}/installations/{installation_id}/addresses", self.base_url);
        let response = self
            .client
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(FetchError::from_transport)?;
        check_status(response)?;
        Ok(())
    }
}

fn check_status(response: Response) -> Result<Response, FetchError> {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
        status @ (StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) => {
            Err(FetchError::InstallationUnavailable(status))
        }
        status if !status.is_success() => Err(FetchError::RequestFailed(status)),
        _ => Ok(response),
    }
}
