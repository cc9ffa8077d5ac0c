#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for protected-area fire alerts.
//!
//! `run` executes the pipeline once, `schedule` keeps running it at the
//! configured times of day. Both read the same TOML config.

mod schedule;

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fire_alert_notify::whapi::WhapiDispatcher;
use fire_alert_pipeline::config::{AlertConfig, WHAPI_TOKEN_ENV};
use fire_alert_pipeline::reference::{FileReferenceLoader, ReferenceLoader};
use fire_alert_pipeline::run::{Collaborators, RunOutcome, run};
use fire_alert_source::firms::{FirmsSource, fetch_map_key_status};
use fire_alert_source::http_client;
use fire_alert_state::JsonFileStateStore;

#[derive(Parser)]
#[command(name = "fire_alert", about = "Satellite fire alerts for protected areas")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, global = true, default_value = "fire_alert.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once
    Run {
        /// Run date (YYYY-MM-DD). Defaults to today in the region.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print the alert instead of sending it; state is not written
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the pipeline at each configured time of day, forever
    Schedule {
        /// Print alerts instead of sending them; state is not written
        #[arg(long)]
        dry_run: bool,
    },
    /// List the configured upstream products
    Sources,
    /// Load all reference data and print what was found
    CheckReference,
}

fn init_logger() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
}

fn count_label(value: Option<u64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

async fn log_map_key_status(config: &AlertConfig, client: &reqwest::Client) {
    match fetch_map_key_status(client, &config.firms.base_url, &config.firms.map_key).await {
        Ok(status) => log::info!(
            "FIRMS map key usage: {}/{} transactions per {}",
            count_label(status.current_transactions),
            count_label(status.transaction_limit),
            status.transaction_interval.as_deref().unwrap_or("window")
        ),
        Err(e) => log::warn!("Could not read FIRMS map key status: {e}"),
    }
}

async fn run_once(
    config: &AlertConfig,
    today: NaiveDate,
    dry_run: bool,
) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    if !dry_run && config.notify.token.trim().is_empty() {
        return Err(format!("notify.token is missing (set it or {WHAPI_TOKEN_ENV})").into());
    }

    let pipeline = config.pipeline_config(dry_run);
    let client = http_client(pipeline.fetch.timeout)?;
    log_map_key_status(config, &client).await;

    let sources = FirmsSource::from_products(
        &config.firms.sources,
        &config.firms.base_url,
        &config.firms.map_key,
        &client,
    );
    let reference = FileReferenceLoader::new(config.reference.clone());
    let dispatcher = WhapiDispatcher::new(
        &config.notify.base_url,
        config.notify.token.clone(),
        Duration::from_secs(config.notify.timeout_secs),
    )?;
    let store = JsonFileStateStore::new(config.state.path.clone());

    let deps = Collaborators {
        sources: &sources,
        reference: &reference,
        dispatcher: &dispatcher,
        store: &store,
    };

    Ok(run(&pipeline, &deps, today).await?)
}

async fn run_scheduled(config: &AlertConfig, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let times = config.schedule.parsed_times()?;
    if times.is_empty() {
        return Err("schedule.times is empty".into());
    }
    log::info!(
        "Scheduling runs at {}",
        times
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    loop {
        let now = schedule::region_now(config.filter.utc_offset_hours);
        let Some(next) = schedule::next_run(now, &times) else {
            return Err("could not compute the next run time".into());
        };
        log::info!("Next run at {next}");
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        match run_once(config, next.date(), dry_run).await {
            Ok(RunOutcome::DryRun { message, .. }) => println!("{message}"),
            Ok(outcome) => {
                if let Some(error) = outcome.failure() {
                    log::error!("Scheduled alert was not delivered: {error}");
                }
            }
            Err(e) => log::error!("Scheduled run failed: {e}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let cli = Cli::parse();
    let config = AlertConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run { date, dry_run } => {
            let today = date.unwrap_or_else(|| {
                schedule::region_now(config.filter.utc_offset_hours).date()
            });
            let outcome = run_once(&config, today, dry_run).await?;
            if let RunOutcome::DryRun { message, .. } = &outcome {
                println!("{message}");
            }
            if let Some(error) = outcome.failure() {
                return Err(format!("alert dispatch failed: {error}").into());
            }
        }
        Commands::Schedule { dry_run } => run_scheduled(&config, dry_run).await?,
        Commands::Sources => {
            println!("{:<20} PRODUCT", "ID");
            println!("{}", "-".repeat(50));
            for source in &config.firms.sources {
                println!("{:<20} {}", source.id, source.product);
            }
        }
        Commands::CheckReference => {
            let data = FileReferenceLoader::new(config.reference.clone()).load()?;
            println!("{:<20} {}", "industrial_sites", data.industrial.len());
            for layer in [
                &data.layers.administrative,
                &data.layers.conservation_units,
                &data.layers.buffer_zones,
            ] {
                println!("{:<20} {} ({})", layer.label(), layer.len(), layer.source_crs());
            }
        }
    }

    Ok(())
}
