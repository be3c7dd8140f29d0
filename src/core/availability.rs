use chrono::{DateTime, TimeDelta, Utc};

const BASE_CHECK_INTERVAL_MINUTES: i64 = 15;
const MAX_CHECK_INTERVAL_MINUTES: i64 = 24 * 60;
const GIVE_UP_AFTER_DAYS: i64 = 30;

/// Per-installation reachability, driven by 403/404 responses.
///
/// Probes back off exponentially. Past the give-up horizon they keep running
/// at the capped interval indefinitely, they are just no longer worth a
/// warning.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum Availability {
    #[default]
    Available,

    Unavailable {
        since: DateTime<Utc>,
        check_count: u32,
        next_check_at: DateTime<Utc>,
    },
}

impl Availability {
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Any successful remote call clears the tracking.
    pub fn mark_success(&mut self) {
        *self = Self::Available;
    }

    /// Record a 403/404 or a failed probe and schedule the next probe.
    /// Returns the backoff delay for logging.
    pub fn mark_unavailable(&mut self, now: DateTime<Utc>) -> TimeDelta {
        let (since, check_count) = match self {
            Self::Available => (now, 1),
            Self::Unavailable { since, check_count, .. } => (*since, *check_count + 1),
        };
        let delay = backoff(check_count);
        *self = Self::Unavailable { since, check_count, next_check_at: now + delay };
        delay
    }

    /// Whether a reachability probe is due.
    pub fn is_probe_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Available => false,
            Self::Unavailable { next_check_at, .. } => now >= *next_check_at,
        }
    }

    /// Unavailable for longer than the give-up horizon.
    pub fn is_given_up(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Available => false,
            Self::Unavailable { since, .. } => now - *since > TimeDelta::days(GIVE_UP_AFTER_DAYS),
        }
    }
}

/// `min(15 min · 2^(count − 1), 24 h)`.
fn backoff(check_count: u32) -> TimeDelta {
    let exponent = check_count.saturating_sub(1).min(8);
    TimeDelta::minutes((BASE_CHECK_INTERVAL_MINUTES << exponent).min(MAX_CHECK_INTERVAL_MINUTES))
}
