use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// Path to the configuration file.
    #[clap(long, env = "GREVLING_CONFIG", default_value = "grevling.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: poll the portal and reconcile statistics until interrupted.
    Run,

    /// One immediate update cycle for one or all installations.
    Refresh(RefreshArgs),

    /// Import an arbitrary past range into the statistics store.
    Backfill(BackfillArgs),

    /// Development tools.
    #[clap(name = "sett")]
    Sett(SettArgs),
}

#[derive(Parser)]
pub struct RefreshArgs {
    /// Limit the refresh to one installation.
    #[clap(long = "installation-id")]
    pub installation_id: Option<String>,
}

#[derive(Parser)]
pub struct BackfillArgs {
    #[clap(long = "installation-id")]
    pub installation_id: String,

    /// Start of the range, in days before today.
    #[clap(long = "from-days")]
    pub from_days: u32,

    /// End of the range, in days before today.
    #[clap(long = "to-days", default_value = "0")]
    pub to_days: u32,
}

#[derive(Parser)]
pub struct SettArgs {
    #[command(subcommand)]
    pub command: SettCommand,
}

#[derive(Subcommand)]
pub enum SettCommand {
    /// Fetch and print the latest readings of every installation.
    Latest,

    /// Fetch and print raw historical readings.
    Historical(HistoricalArgs),

    /// Check which installations are reachable.
    Probe,
}

#[derive(Parser)]
pub struct HistoricalArgs {
    #[clap(long = "installation-id")]
    pub installation_id: String,

    /// How many days back to fetch.
    #[clap(long, default_value = "7")]
    pub days: u32,
}
