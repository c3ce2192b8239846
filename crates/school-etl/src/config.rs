//! Configuration management
//!
//! Everything the pipeline needs from its environment: where to fetch, where
//! to load, when to run and how hard to retry. Values come from process
//! environment variables (with a `.env` file honoured via `dotenvy`), falling
//! back to the defaults below.

use chrono::NaiveDate;
use school_etl_common::{EtlError, Result};
use serde::Serialize;
use std::time::Duration;

use crate::scheduler::Schedule;

// ============================================================================
// Configuration Defaults
// ============================================================================

/// Default source endpoint for the school directory.
pub const DEFAULT_SOURCE_URL: &str = "https://api-sekolah-indonesia.vercel.app/sekolah";

/// Default page to request.
pub const DEFAULT_SOURCE_PAGE: u32 = 1;

/// Default page size. One page covers the whole working set.
pub const DEFAULT_SOURCE_PAGE_SIZE: u32 = 5000;

/// Default HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// User agent sent with every source request.
pub const DEFAULT_USER_AGENT: &str = concat!("school-etl/", env!("CARGO_PKG_VERSION"));

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/school_etl";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default destination schema.
pub const DEFAULT_TARGET_SCHEMA: &str = "hijir";

/// Default destination table.
pub const DEFAULT_TARGET_TABLE: &str = "target_table";

/// Default number of rows per INSERT statement.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

/// Default run cadence.
pub const DEFAULT_SCHEDULE: &str = "@daily";

/// Default retries per stage after the first attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Default fixed delay between stage retries (5 minutes).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;

/// Default owner recorded on every run.
pub const DEFAULT_OWNER: &str = "hijir";

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default()
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub target: TargetConfig,
    pub schedule: ScheduleConfig,
}

/// Source API configuration
#[derive(Debug, Clone, Serialize)]
pub struct SourceConfig {
    pub url: String,
    pub page: u32,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Destination table configuration
#[derive(Debug, Clone, Serialize)]
pub struct TargetConfig {
    pub schema: String,
    pub table: String,
    pub insert_batch_size: usize,
}

/// Scheduling and retry configuration
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfig {
    pub cadence: Schedule,
    /// No scheduled run fires before midnight UTC of this date
    pub start_date: NaiveDate,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub owner: String,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let config = Config {
            source: SourceConfig {
                url: env.string("SCHOOL_ETL_SOURCE_URL", DEFAULT_SOURCE_URL),
                page: env.parse("SCHOOL_ETL_PAGE", DEFAULT_SOURCE_PAGE)?,
                page_size: env.parse("SCHOOL_ETL_PAGE_SIZE", DEFAULT_SOURCE_PAGE_SIZE)?,
                timeout_secs: env.parse("SCHOOL_ETL_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
                user_agent: env.string("SCHOOL_ETL_USER_AGENT", DEFAULT_USER_AGENT),
            },
            database: DatabaseConfig {
                url: env.string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env
                    .parse("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
                connect_timeout_secs: env
                    .parse("DATABASE_CONNECT_TIMEOUT", DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS)?,
            },
            target: TargetConfig {
                schema: env.string("SCHOOL_ETL_TARGET_SCHEMA", DEFAULT_TARGET_SCHEMA),
                table: env.string("SCHOOL_ETL_TARGET_TABLE", DEFAULT_TARGET_TABLE),
                insert_batch_size: env
                    .parse("SCHOOL_ETL_INSERT_BATCH_SIZE", DEFAULT_INSERT_BATCH_SIZE)?,
            },
            schedule: ScheduleConfig {
                cadence: env.parse("SCHOOL_ETL_SCHEDULE", Schedule::Daily)?,
                start_date: env.parse("SCHOOL_ETL_START_DATE", default_start_date())?,
                retries: env.parse("SCHOOL_ETL_RETRIES", DEFAULT_RETRIES)?,
                retry_delay_secs: env.parse("SCHOOL_ETL_RETRY_DELAY_SECS", DEFAULT_RETRY_DELAY_SECS)?,
                owner: env.string("SCHOOL_ETL_OWNER", DEFAULT_OWNER),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(EtlError::Config("Source URL cannot be empty".to_string()));
        }

        if reqwest::Url::parse(&self.source.url).is_err() {
            return Err(EtlError::Config(format!(
                "Source URL is not a valid URL: {}",
                self.source.url
            )));
        }

        if self.source.page == 0 {
            return Err(EtlError::Config("Source page starts at 1".to_string()));
        }

        if self.source.page_size == 0 {
            return Err(EtlError::Config("Source page size must be greater than 0".to_string()));
        }

        if self.source.timeout_secs == 0 {
            return Err(EtlError::Config("HTTP timeout must be greater than 0".to_string()));
        }

        if self.database.url.trim().is_empty() {
            return Err(EtlError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(EtlError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.target.schema.trim().is_empty() || self.target.table.trim().is_empty() {
            return Err(EtlError::Config(
                "Target schema and table cannot be empty".to_string(),
            ));
        }

        if self.target.insert_batch_size == 0 {
            return Err(EtlError::Config("Insert batch size must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Copy safe to print: the database password is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Ok(mut url) = reqwest::Url::parse(&copy.database.url) {
            if url.password().is_some() && url.set_password(Some("****")).is_ok() {
                copy.database.url = url.to_string();
            }
        }
        copy
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                url: DEFAULT_SOURCE_URL.to_string(),
                page: DEFAULT_SOURCE_PAGE,
                page_size: DEFAULT_SOURCE_PAGE_SIZE,
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            target: TargetConfig {
                schema: DEFAULT_TARGET_SCHEMA.to_string(),
                table: DEFAULT_TARGET_TABLE.to_string(),
                insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            },
            schedule: ScheduleConfig {
                cadence: Schedule::Daily,
                start_date: default_start_date(),
                retries: DEFAULT_RETRIES,
                retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
                owner: DEFAULT_OWNER.to_string(),
            },
        }
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    /// Unset means default; set but unparsable is an error, not a silent fallback.
    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| EtlError::Config(format!("{}={:?}: {}", key, raw, e))),
        }
    }
}
