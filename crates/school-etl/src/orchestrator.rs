//! Run orchestrator
//!
//! Runs extract, transform and load in sequence, passing each stage's return
//! value to the next. This is the only place retries happen: each stage is
//! re-run under a fixed-backoff `RetryPolicy`. Stages never retry or swallow
//! errors themselves.

use school_etl_common::{EtlError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{Config, ScheduleConfig};
use crate::extract::{HttpExtractor, Source};
use crate::load::{PostgresLoader, Sink};
use crate::run::{RunContext, RunReport};
use crate::transform::{TransformRules, Transformer};

/// Pipeline stage, for logs and retry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Extract => write!(f, "extract"),
            Stage::Transform => write!(f, "transform"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// Fixed-backoff retry applied to each stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// Returns the outcome and the number of attempts made. The last error
    /// is returned unchanged.
    pub async fn run<T, F, Fut>(&self, stage: Stage, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        %stage,
                        attempt,
                        max_attempts,
                        kind = e.kind(),
                        error = %e,
                        delay_secs = self.delay.as_secs(),
                        "Stage failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                },
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&ScheduleConfig> for RetryPolicy {
    fn from(config: &ScheduleConfig) -> Self {
        Self::new(config.retries, config.retry_delay())
    }
}

/// Runs one end-to-end pipeline execution per call
pub struct Orchestrator {
    source: Arc<dyn Source>,
    transformer: Transformer,
    sink: Arc<dyn Sink>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn Source>,
        transformer: Transformer,
        sink: Arc<dyn Sink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            transformer,
            sink,
            retry,
        }
    }

    /// Production wiring: HTTP source, default transform rules, PostgreSQL sink
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpExtractor::new(config.source.clone())?;
        let sink = PostgresLoader::connect_lazy(&config.database, &config.target)?;

        Ok(Self::new(
            Arc::new(source),
            Transformer::new(TransformRules::default()),
            Arc::new(sink),
            RetryPolicy::from(&config.schedule),
        ))
    }

    /// Execute one run. Any stage error aborts the run and is returned as-is.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunReport> {
        let span = info_span!(
            "run",
            run_id = %ctx.run_id,
            trigger = %ctx.trigger,
            logical_date = %ctx.logical_date
        );

        async {
            info!(source = %self.source.describe(), sink = %self.sink.describe(), "Run started");

            let mut report = RunReport::start(ctx);
            let result = self.execute(&mut report).await;

            match result {
                Ok(()) => {
                    report.complete();
                    info!(
                        rows_loaded = report.rows_loaded,
                        records_fetched = report.records_fetched,
                        retention_pct = format!("{:.1}", report.retention_rate()),
                        duration_secs = report.duration_secs,
                        "Run succeeded"
                    );
                    Ok(report)
                },
                Err((stage, e)) => {
                    error!(%stage, kind = e.kind(), error = %e, "Run failed");
                    Err(e)
                },
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, report: &mut RunReport) -> std::result::Result<(), (Stage, EtlError)> {
        let source = self.source.as_ref();
        let transformer = &self.transformer;
        let sink = self.sink.as_ref();

        let (page, attempts) = self.retry.run(Stage::Extract, || source.fetch()).await;
        report.extract_attempts = attempts;
        let page = page.map_err(|e| (Stage::Extract, e))?;

        let page_ref = &page;
        let (transformed, attempts) = self
            .retry
            .run(Stage::Transform, || async move {
                transformer.transform_with_summary(page_ref)
            })
            .await;
        report.transform_attempts = attempts;
        let (dataset, summary) = transformed.map_err(|e| (Stage::Transform, e))?;
        report.record_transform(&summary);
        drop(page);

        let dataset_ref = &dataset;
        let (loaded, attempts) = self
            .retry
            .run(Stage::Load, || sink.load(dataset_ref))
            .await;
        report.load_attempts = attempts;
        let load_result = loaded.map_err(|e| (Stage::Load, e))?;
        report.record_load(&load_result);

        Ok(())
    }
}
