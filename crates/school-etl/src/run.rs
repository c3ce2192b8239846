//! Run metadata and run statistics
//!
//! Every invocation of the pipeline receives an explicit `RunContext` instead
//! of reading scheduler state from anywhere global.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::LoadResult;
use crate::transform::TransformSummary;

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Fired by the scheduler at a tick
    Scheduled,
    /// Started by hand from the command line
    Manual,
}

impl std::fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunTrigger::Scheduled => write!(f, "scheduled"),
            RunTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Identity of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    /// The tick this run stands for (the current time for manual runs)
    pub logical_date: DateTime<Utc>,
    pub trigger: RunTrigger,
}

impl RunContext {
    pub fn scheduled(tick: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            logical_date: tick,
            trigger: RunTrigger::Scheduled,
        }
    }

    pub fn manual() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            logical_date: Utc::now(),
            trigger: RunTrigger::Manual,
        }
    }
}

/// Statistics collected during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub logical_date: DateTime<Utc>,
    pub records_fetched: usize,
    pub rows_filtered_out: usize,
    pub rows_invalid_coordinates: usize,
    pub rows_loaded: u64,
    pub extract_attempts: u32,
    pub transform_attempts: u32,
    pub load_attempts: u32,
    pub table: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn start(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id,
            trigger: ctx.trigger,
            logical_date: ctx.logical_date,
            records_fetched: 0,
            rows_filtered_out: 0,
            rows_invalid_coordinates: 0,
            rows_loaded: 0,
            extract_attempts: 0,
            transform_attempts: 0,
            load_attempts: 0,
            table: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_secs: 0.0,
        }
    }

    pub fn record_transform(&mut self, summary: &TransformSummary) {
        self.records_fetched = summary.records_fetched;
        self.rows_filtered_out = summary.filtered_out;
        self.rows_invalid_coordinates = summary.invalid_coordinates;
    }

    pub fn record_load(&mut self, result: &LoadResult) {
        self.rows_loaded = result.rows_written;
        self.table = Some(result.table.clone());
    }

    /// Mark the report as completed
    pub fn complete(&mut self) {
        let end = Utc::now();
        self.completed_at = Some(end);
        self.duration_secs = (end - self.started_at).num_milliseconds() as f64 / 1000.0;
    }

    /// Share of fetched records that reached the table, as a percentage
    pub fn retention_rate(&self) -> f64 {
        if self.records_fetched > 0 {
            (self.rows_loaded as f64 / self.records_fetched as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_context_keeps_tick() {
        let tick = "2024-05-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap_or_default();
        let ctx = RunContext::scheduled(tick);

        assert_eq!(ctx.logical_date, tick);
        assert_eq!(ctx.trigger, RunTrigger::Scheduled);
        assert_ne!(ctx.run_id, RunContext::scheduled(tick).run_id);
    }

    #[test]
    fn test_report_lifecycle() {
        let ctx = RunContext::manual();
        let mut report = RunReport::start(&ctx);
        assert!(report.completed_at.is_none());

        report.record_transform(&TransformSummary {
            records_fetched: 10,
            filtered_out: 6,
            invalid_coordinates: 2,
            rows_kept: 2,
        });
        report.record_load(&LoadResult {
            table: "\"hijir\".\"target_table\"".to_string(),
            columns: vec!["npsn".to_string()],
            rows_written: 2,
            batches: 1,
        });
        report.complete();

        assert_eq!(report.run_id, ctx.run_id);
        assert_eq!(report.trigger, RunTrigger::Manual);
        assert!(report.completed_at.is_some());
        assert!(report.duration_secs >= 0.0);
        assert_eq!(report.retention_rate(), 20.0);
    }

    #[test]
    fn test_trigger_serializes_snake_case() {
        let encoded = serde_json::to_string(&RunTrigger::Scheduled).unwrap_or_default();
        assert_eq!(encoded, "\"scheduled\"");
    }
}
