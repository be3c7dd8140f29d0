pub mod availability;
pub mod backfill;
pub mod meter_state;
pub mod poller;
pub mod reconcile;
pub mod source;
pub mod value;
