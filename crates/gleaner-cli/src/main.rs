//! Gleaner service runner
//!
//! One binary, four roles: the LLM queue worker, the internal scrape
//! service, one-shot extraction jobs, and DLQ maintenance. Configuration
//! comes from the environment (`KE_` prefix); startup refuses to proceed on
//! a missing or weak API key.

mod bootstrap;
mod cli;
mod commands;
mod settings;

use anyhow::Result;
use bootstrap::Runtime;
use clap::Parser;
use cli::{Cli, Command};
use settings::Settings;
use std::process;
use tracing_subscriber::EnvFilter;

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_new(settings.log_level.to_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if settings.log_format == "pretty" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().map_err(anyhow::Error::msg)?;
    init_tracing(&settings);

    match cli.command {
        Command::Worker { worker_id } => {
            let runtime = Runtime::build(settings).await?;
            commands::worker::run(runtime, worker_id).await
        }
        Command::Scraper => commands::scraper::run(settings).await,
        Command::Extract { project, source_ids, job } => {
            let runtime = Runtime::build(settings).await?;
            commands::extract::run(runtime, project, source_ids, job).await
        }
        Command::Dlq { action } => {
            let runtime = Runtime::build(settings).await?;
            commands::dlq::run(runtime, action).await
        }
    }
}
