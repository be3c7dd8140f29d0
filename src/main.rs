mod api;
mod cli;
mod config;
mod core;
mod prelude;
mod store;
mod tables;

use chrono::Utc;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{meterportal::Api, models::Installation},
    cli::{Args, BackfillArgs, Command, HistoricalArgs, SettCommand},
    config::Config,
    core::{backfill::Backfill, meter_state::SeriesId, poller::Poller},
    prelude::*,
    store::{file::FileStore, state::MeterStates},
    tables::{build_backfill_table, build_counters_table, build_readings_table},
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let config = Config::read_from(&args.config)?;
    let api = Api::try_new(&config.api_key, &config.base_url)?;

    match args.command {
        Command::Run => run(&config, &api).await,
        Command::Refresh(refresh_args) => {
            refresh(&config, &api, refresh_args.installation_id.as_deref()).await
        }
        Command::Backfill(backfill_args) => backfill(&config, &api, &backfill_args).await,
        Command::Sett(sett_args) => match sett_args.command {
            SettCommand::Latest => sett_latest(&config, &api).await,
            SettCommand::Historical(historical_args) => {
                sett_historical(&config, &api, &historical_args).await
            }
            SettCommand::Probe => sett_probe(&config, &api).await,
        },
    }
}

/// Poll every installation until interrupted.
async fn run(config: &Config, api: &Api) -> Result {
    let store = FileStore::new(&config.statistics_path);
    let mut states = MeterStates::read_from(&config.state_path);
    let polling_interval = config.polling_interval();

    let mut pollers: Vec<Poller<'_, Api>> = config
        .installations
        .iter()
        .map(|installation| {
            let mut poller = Poller::builder()
                .source(api)
                .installation(installation)
                .polling_interval(polling_interval)
                .build();
            poller.subscribe(|update| {
                info!(
                    installation_id = update.installation_id,
                    counter_type = update.counter_type.as_str(),
                    value = update.value,
                    unit = update.unit.as_deref().unwrap_or_default(),
                    "Meter updated",
                );
            });
            poller
        })
        .collect();
    info!(n_installations = pollers.len(), ?polling_interval, "Started");

    let mut interval = tokio::time::interval(polling_interval.to_std()?);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let now = Utc::now();
        for poller in &mut pollers {
            poller.update_cycle(now, &store, &mut states).await;
        }
    }
}

/// One immediate cycle, ignoring the throttle.
async fn refresh(config: &Config, api: &Api, installation_id: Option<&str>) -> Result {
    let store = FileStore::new(&config.statistics_path);
    let mut states = MeterStates::read_from(&config.state_path);
    let now = Utc::now();

    for installation in config
        .installations
        .iter()
        .filter(|installation| {
            installation_id.is_none_or(|installation_id| {
                installation.installation_id == installation_id
            })
        })
    {
        let mut poller = Poller::builder()
            .source(api)
            .installation(installation)
            .polling_interval(config.polling_interval())
            .build();
        let outcome = poller.refresh(now, &store, &mut states).await;
        info!(installation_id = installation.installation_id, ?outcome, "Refreshed");
    }
    Ok(())
}

async fn backfill(config: &Config, api: &Api, args: &BackfillArgs) -> Result {
    let installation = find_installation(config, &args.installation_id)?;
    let store = FileStore::new(&config.statistics_path);
    let mut states = MeterStates::read_from(&config.state_path);
    let now = Utc::now();

    let latest = api.get_latest_readings(&installation.installation_id).await?;
    let mut results = Vec::new();
    for counter in
        latest.meter_counters.iter().filter(|counter| counter.counter_type.is_consumable())
    {
        let n_records = Backfill::builder()
            .source(api)
            .store(&store)
            .installation(installation)
            .counter(counter)
            .from_days_ago(args.from_days)
            .to_days_ago(args.to_days)
            .build()
            .run(now)
            .await?;
        results.push((SeriesId::new(&installation.installation_id, counter), n_records));
    }
    println!("{}", build_backfill_table(&results));

    states.extend_history_fetched_days(30);
    states.persist();
    Ok(())
}

async fn sett_latest(config: &Config, api: &Api) -> Result {
    for installation in &config.installations {
        let latest = api.get_latest_readings(&installation.installation_id).await?;
        println!("{}", installation.device_name());
        if let Some(primary) = latest.primary_counter() {
            println!("primary counter: {}", primary.meter_counter_id);
        }
        println!("{}", build_counters_table(&latest.meter_counters));
    }
    Ok(())
}

async fn sett_historical(config: &Config, api: &Api, args: &HistoricalArgs) -> Result {
    let installation = find_installation(config, &args.installation_id)?;
    let now = Utc::now();
    let from = (now - chrono::TimeDelta::days(i64::from(args.days))).date_naive();
    let readings = api
        .get_historical_readings(&installation.installation_id, from, now.date_naive())
        .await?;
    println!("{}", build_readings_table(&readings));
    Ok(())
}

async fn sett_probe(config: &Config, api: &Api) -> Result {
    for installation in &config.installations {
        match api.probe_addresses(&installation.installation_id).await {
            Ok(()) => println!("{}: reachable", installation.installation_id),
            Err(error) => println!("{}: {error}", installation.installation_id),
        }
    }
    Ok(())
}

fn find_installation<'a>(config: &'a Config, installation_id: &str) -> Result<&'a Installation> {
    config
        .installations
        .iter()
        .find(|installation| installation.installation_id == installation_id)
        .with_context(|| format!("no installation `{installation_id}` in the configuration"))
}
