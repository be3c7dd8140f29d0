pub mod file;
pub mod state;
pub mod statistics;
