//! School ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Periodic extract-transform-load of the Indonesian school directory into
//! PostgreSQL.
//!
//! # Overview
//!
//! One run fetches a page of school records over HTTP, keeps the public
//! senior high schools, derives a combined address column, drops rows with
//! unusable coordinates and replaces the destination table's contents.
//!
//! - **Extract** ([`extract`]): HTTP GET of one page, decoded as JSON
//! - **Transform** ([`transform`]): pure filtering, derivation and coercion
//! - **Load** ([`load`]): full replace of a PostgreSQL table in one transaction
//! - **Orchestration** ([`orchestrator`]): runs the stages in order with per-stage retries
//! - **Scheduling** ([`scheduler`]): fires runs on a cadence, one at a time
//!
//! # Example
//!
//! ```no_run
//! use school_etl::{config::Config, orchestrator::Orchestrator, run::RunContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let report = Orchestrator::from_config(&config)?
//!         .run(&RunContext::manual())
//!         .await?;
//!     println!("{} rows loaded", report.rows_loaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod extract;
pub mod load;
pub mod models;
pub mod orchestrator;
pub mod run;
pub mod scheduler;
pub mod transform;

// Re-export commonly used types
pub use config::Config;
pub use models::{CleanDataset, LoadResult, RawPage};
pub use orchestrator::{Orchestrator, RetryPolicy};
pub use run::{RunContext, RunReport};
pub use school_etl_common::{EtlError, Result};

use clap::{Parser, Subcommand};

/// school-etl - load public senior high schools into PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "school-etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one run now and exit
    Run {
        /// Page to request (overrides SCHOOL_ETL_PAGE)
        #[arg(long)]
        page: Option<u32>,

        /// Records per page (overrides SCHOOL_ETL_PAGE_SIZE)
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Run on the configured schedule until interrupted
    Schedule,

    /// Validate configuration and print it with secrets masked
    CheckConfig,
}
