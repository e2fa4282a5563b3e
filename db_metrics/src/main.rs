mod analysis;
mod charts;
mod classify;
mod config;
mod error;
mod loader;
mod logging;
mod model;
mod output;
mod quota;
mod rank;
mod report;
mod sizes;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use crate::config::Config;
use crate::loader::{collect_snapshot, CartoClient};
use crate::output::ReportDestination;
use crate::report::{build_metrics, MetricsOptions, ReportModel};

/// Gather the account data, aggregate it and write the HTML report.
///
/// Credentials and the output destination are validated before any request
/// is made. The report is rendered in full before anything is written.
async fn run(config: &Config) -> Result<()> {
    let credentials = config.credentials()?;
    let destination = ReportDestination::parse(&config.output)?;

    info!(user = %credentials.user, "Gathering all the information...");
    let client = CartoClient::new(&credentials)?;
    info!(api = %client.base_url(), "Using CARTO API");
    let snapshot = collect_snapshot(&client).await?;

    let options = MetricsOptions {
        user_quota: config.quota,
        excluded_services: config.excluded_services.clone(),
    };
    let metrics = build_metrics(&snapshot, &options);

    let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
    let model = ReportModel::new(
        &credentials.user,
        credentials.organization.as_deref(),
        generated_at,
        metrics,
    )?;
    let html = report::render(&model)?;

    destination.write(&html).await?;
    info!(destination = %destination, "Finished!");

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = Config::parse();
    logging::init(&config.log_format, config.log_level.as_str());

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
