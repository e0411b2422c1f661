// src/main.rs
//! Hangar Watch: binary entrypoint.
//! Loads `.env`, initialises tracing and metrics, then dispatches the CLI subcommand.

use std::process::ExitCode;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hangar_watch::cli::{Cli, Command};
use hangar_watch::config::{RegionRegistry, Settings};
use hangar_watch::metrics::Metrics;
use hangar_watch::pipeline::{send_test_email, test_configuration, Pipeline, RunMode};
use hangar_watch::scheduler::{run_weekly, WeeklySchedule};

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine; real env vars still apply.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli.command()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = ?e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(cmd: Command) -> Result<bool> {
    let settings = Settings::from_env()?;

    let metrics = if settings.metrics_textfile {
        match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let ok = dispatch(cmd, &settings, metrics.as_ref()).await;
    flush_metrics(metrics.as_ref(), &settings);
    ok
}

fn flush_metrics(metrics: Option<&Metrics>, settings: &Settings) {
    if let Some(m) = metrics {
        match m.write_textfile(&settings.reports_dir) {
            Ok(path) => info!(path = %path.display(), "metrics written"),
            Err(e) => warn!(error = ?e, "could not write metrics textfile"),
        }
    }
}

fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let registry = RegionRegistry::load(settings)?;
    Pipeline::from_settings(settings, registry)
}

async fn dispatch(cmd: Command, settings: &Settings, metrics: Option<&Metrics>) -> Result<bool> {
    let now = || Local::now().naive_local();
    match cmd {
        Command::Test => Ok(test_configuration(settings).passed()),
        Command::Email => {
            let registry = RegionRegistry::load(settings)?;
            send_test_email(settings, &registry).await
        }
        Command::Backfill => Ok(build_pipeline(settings)?
            .run_all(RunMode::Backfill, now())
            .await),
        Command::Weekly => Ok(build_pipeline(settings)?
            .run_all(RunMode::Weekly, now())
            .await),
        Command::Region { region } => {
            let outcome = build_pipeline(settings)?
                .run_region(region, RunMode::Weekly, now())
                .await?;
            info!(region = region.id(), ?outcome, "region run done");
            Ok(true)
        }
        Command::Audit { region } => {
            build_pipeline(settings)?.audit(region, now()).await?;
            Ok(true)
        }
        Command::Schedule => {
            let pipeline = build_pipeline(settings)?;
            let schedule = WeeklySchedule::new(settings.schedule_day, settings.schedule_time);
            let p = &pipeline;
            run_weekly(schedule, move || async move {
                let ok = p.run_all(RunMode::Weekly, Local::now().naive_local()).await;
                flush_metrics(metrics, settings);
                ok
            })
            .await;
            Ok(true)
        }
    }
}
