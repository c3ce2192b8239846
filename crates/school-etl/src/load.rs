//! Loader stage
//!
//! Makes the destination table's contents exactly equal to a `CleanDataset`.
//!
//! Everything happens inside one transaction:
//!
//! 1. `pg_advisory_xact_lock` on the table identity, so two loaders never
//!    interleave on the same table
//! 2. `CREATE SCHEMA IF NOT EXISTS` / `CREATE TABLE IF NOT EXISTS`, every
//!    column `TEXT`
//! 3. A fresh `<table>_staging` table built from the dataset's columns and
//!    filled with multi-row `INSERT`s in batches
//! 4. `DROP` the target and `RENAME` the staging table into its place
//! 5. `COMMIT`
//!
//! Readers see either the old table or the new one. A failure (or a dropped
//! future) before commit rolls the whole thing back.
//!
//! Columns are stored as `TEXT` on purpose: the source schema is owned by a
//! third party and drifts. The table is rebuilt from the dataset's columns on
//! every load, so added or removed source fields never break a load.

use async_trait::async_trait;
use school_etl_common::{EtlError, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{DatabaseConfig, TargetConfig};
use crate::models::{CleanDataset, LoadResult};

/// PostgreSQL caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

/// Anything that can take a `CleanDataset` and persist it
#[async_trait]
pub trait Sink: Send + Sync {
    /// Replace the destination contents with `dataset`
    async fn load(&self, dataset: &CleanDataset) -> Result<LoadResult>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Schema-qualified table identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// `"schema"."table"`, safe to splice into SQL
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Sibling table the next contents are built in before the swap
    pub fn staging(&self) -> Self {
        Self::new(&self.schema, format!("{}_staging", self.table))
    }
}

impl From<&TargetConfig> for TableName {
    fn from(target: &TargetConfig) -> Self {
        Self::new(&target.schema, &target.table)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column list for the destination: source order, first occurrence wins.
///
/// Returns `(dataset column index, name)` pairs.
pub fn distinct_columns(columns: &[String]) -> Vec<(usize, &str)> {
    let mut seen: Vec<(usize, &str)> = Vec::with_capacity(columns.len());
    for (index, name) in columns.iter().enumerate() {
        if !seen.iter().any(|(_, existing)| *existing == name) {
            seen.push((index, name.as_str()));
        }
    }
    seen
}

pub fn create_schema_sql(target: &TableName) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&target.schema))
}

/// `CREATE TABLE IF NOT EXISTS` with every column typed `TEXT`
pub fn create_table_sql(target: &TableName, columns: &[&str]) -> String {
    let definitions = columns
        .iter()
        .map(|column| format!("{} TEXT", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        target.qualified(),
        definitions
    )
}

pub fn drop_table_sql(target: &TableName) -> String {
    format!("DROP TABLE IF EXISTS {}", target.qualified())
}

/// Rename `from` to `to`'s table name; both must share a schema
pub fn rename_table_sql(from: &TableName, to: &TableName) -> String {
    format!("ALTER TABLE {} RENAME TO {}", from.qualified(), quote_ident(&to.table))
}

/// Rows per INSERT, capped so one statement stays under the bind limit
pub fn rows_per_statement(batch_size: usize, column_count: usize) -> usize {
    if column_count == 0 {
        return batch_size.max(1);
    }
    batch_size.clamp(1, (MAX_BIND_PARAMS / column_count).max(1))
}

fn sink_error(context: &str) -> impl FnOnce(sqlx::Error) -> EtlError + '_ {
    move |e| EtlError::SinkUnavailable(format!("{}: {}", context, e))
}

/// PostgreSQL loader with full-replace semantics
#[derive(Clone)]
pub struct PostgresLoader {
    pool: PgPool,
    target: TableName,
    batch_size: usize,
}

impl PostgresLoader {
    pub fn new(pool: PgPool, target: TableName, batch_size: usize) -> Self {
        Self {
            pool,
            target,
            batch_size,
        }
    }

    /// Build a loader whose pool connects on first use.
    ///
    /// An unreachable database therefore surfaces as `SinkUnavailable` from
    /// `load`, not at startup.
    pub fn connect_lazy(database: &DatabaseConfig, target: &TargetConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
            .connect_lazy(&database.url)
            .map_err(|e| EtlError::Config(format!("Invalid database URL: {}", e)))?;

        Ok(Self::new(pool, TableName::from(target), target.insert_batch_size))
    }

    async fn replace(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        dataset: &CleanDataset,
    ) -> Result<LoadResult> {
        let qualified = self.target.qualified();
        let columns = distinct_columns(dataset.columns());
        let names: Vec<&str> = columns.iter().map(|(_, name)| *name).collect();

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&qualified)
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to acquire table lock"))?;

        // Schema ensure
        sqlx::query(&create_schema_sql(&self.target))
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to create schema"))?;

        if names.is_empty() {
            return self.empty_existing(tx).await;
        }

        sqlx::query(&create_table_sql(&self.target, &names))
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to create table"))?;

        // Full replace: build the new contents beside the target, then swap
        let staging = self.target.staging();

        sqlx::query(&drop_table_sql(&staging))
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to clear staging table"))?;

        sqlx::query(&create_table_sql(&staging, &names))
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to create staging table"))?;

        let mut rows_written = 0u64;
        let mut batches = 0usize;

        if !dataset.is_empty() {
            let staging_qualified = staging.qualified();
            let chunk_size = rows_per_statement(self.batch_size, names.len());
            let column_list = names
                .iter()
                .map(|name| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", ");
            let total_chunks = dataset.len().div_ceil(chunk_size);

            for (chunk_idx, chunk) in dataset.rows().chunks(chunk_size).enumerate() {
                debug!(
                    chunk = chunk_idx + 1,
                    total_chunks,
                    rows = chunk.len(),
                    "Inserting batch"
                );

                let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                    "INSERT INTO {} ({}) ",
                    staging_qualified, column_list
                ));

                query_builder.push_values(chunk, |mut b, row| {
                    for (index, _) in &columns {
                        b.push_bind(row.cell(*index).and_then(|cell| cell.to_text()));
                    }
                });

                let result = query_builder
                    .build()
                    .execute(&mut **tx)
                    .await
                    .map_err(sink_error("Failed to insert rows"))?;

                rows_written += result.rows_affected();
                batches += 1;
            }
        }

        sqlx::query(&drop_table_sql(&self.target))
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to drop previous table"))?;

        sqlx::query(&rename_table_sql(&staging, &self.target))
            .execute(&mut **tx)
            .await
            .map_err(sink_error("Failed to swap in staging table"))?;

        Ok(LoadResult {
            table: qualified,
            columns: names.iter().map(|name| name.to_string()).collect(),
            rows_written,
            batches,
        })
    }

    /// A dataset without columns cannot describe a table: an existing one is
    /// emptied in place, otherwise nothing is created.
    async fn empty_existing(&self, tx: &mut Transaction<'_, Postgres>) -> Result<LoadResult> {
        let qualified = self.target.qualified();

        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&qualified)
            .fetch_one(&mut **tx)
            .await
            .map_err(sink_error("Failed to look up table"))?;

        if exists {
            sqlx::query(&format!("TRUNCATE TABLE {}", qualified))
                .execute(&mut **tx)
                .await
                .map_err(sink_error("Failed to truncate table"))?;
        }

        Ok(LoadResult {
            table: qualified,
            columns: Vec::new(),
            rows_written: 0,
            batches: 0,
        })
    }
}

#[async_trait]
impl Sink for PostgresLoader {
    async fn load(&self, dataset: &CleanDataset) -> Result<LoadResult> {
        info!(
            table = %self.target,
            rows = dataset.len(),
            columns = dataset.columns().len(),
            "Replacing table contents"
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(sink_error("Failed to start transaction"))?;

        // On error the transaction is dropped here, which rolls it back
        let result = self.replace(&mut tx, dataset).await?;

        tx.commit()
            .await
            .map_err(sink_error("Failed to commit replace"))?;

        info!(
            table = %self.target,
            rows_written = result.rows_written,
            batches = result.batches,
            "Table contents replaced"
        );

        Ok(result)
    }

    fn describe(&self) -> String {
        self.target.to_string()
    }
}
