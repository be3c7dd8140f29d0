pub mod client;
pub mod meterportal;
pub mod models;
