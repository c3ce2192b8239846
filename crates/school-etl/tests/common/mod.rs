//! Common test utilities for school-etl integration tests using testcontainers
//!
//! Spins up a throwaway PostgreSQL container per test so loader behaviour is
//! exercised against a real server. Tests using this module need Docker and
//! are marked `#[ignore = "requires Docker"]`; run them with
//! `cargo test -- --ignored`.

#![allow(dead_code)]

use anyhow::{Context, Result};
use school_etl::config::TargetConfig;
use school_etl::load::{PostgresLoader, TableName};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// PostgreSQL image tag used by the tests
pub const POSTGRES_TAG: &str = "16-alpine";

/// PostgreSQL test container wrapper
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    /// Start a new PostgreSQL container and connect a pool to it
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag(POSTGRES_TAG)
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("PostgreSQL test container ready");

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Loader writing to `schema.table` on this container
    pub fn loader(&self, schema: &str, table: &str, batch_size: usize) -> PostgresLoader {
        PostgresLoader::new(self.pool.clone(), TableName::new(schema, table), batch_size)
    }

    pub fn target_config(schema: &str, table: &str) -> TargetConfig {
        TargetConfig {
            schema: schema.to_string(),
            table: table.to_string(),
            insert_batch_size: 1000,
        }
    }

    /// Every row of `schema.table` as text, ordered by the first column
    pub async fn rows(&self, schema: &str, table: &str) -> Result<Vec<Vec<Option<String>>>> {
        let columns = self.columns(schema, table).await?;
        let select_list = columns
            .iter()
            .map(|c| format!("{}::text", school_etl::load::quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY 1",
            select_list,
            TableName::new(schema, table).qualified()
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read table")?;

        rows.iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.try_get::<Option<String>, _>(i).context("Failed to decode cell"))
                    .collect()
            })
            .collect()
    }

    /// Column names of `schema.table` in ordinal order
    pub async fn columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read column list")
    }

    /// Data types of `schema.table` columns in ordinal order
    pub async fn column_types(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT data_type::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read column types")
    }
}
