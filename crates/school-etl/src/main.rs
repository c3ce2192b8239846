//! school-etl - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use school_etl::{
    config::Config, orchestrator::Orchestrator, run::RunContext, scheduler::Scheduler, Cli,
    Commands,
};
use school_etl_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("school-etl")
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.with_env_overrides().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring invalid logging environment: {:#}", e);
        LogConfig::builder().log_file_prefix("school-etl").build()
    });

    // Held until exit so buffered file output is flushed
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    };

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run { page, page_size } => {
            let mut config = Config::load().context("Failed to load configuration")?;
            if let Some(page) = page {
                config.source.page = *page;
            }
            if let Some(page_size) = page_size {
                config.source.page_size = *page_size;
            }
            config.validate().context("Invalid configuration")?;

            let orchestrator = Orchestrator::from_config(&config)?;
            let report = orchestrator.run(&RunContext::manual()).await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        },

        Commands::Schedule => {
            let config = Config::load().context("Failed to load configuration")?;
            info!(
                owner = %config.schedule.owner,
                schedule = %config.schedule.cadence,
                start_date = %config.schedule.start_date,
                retries = config.schedule.retries,
                "Starting scheduler"
            );

            let orchestrator = Orchestrator::from_config(&config)?;
            Scheduler::new(config.schedule.cadence, config.schedule.start_date, orchestrator)
                .run_until(shutdown_signal())
                .await;

            info!("Scheduler shut down gracefully");
            Ok(())
        },

        Commands::CheckConfig => {
            let config = Config::load().context("Failed to load configuration")?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        },
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
