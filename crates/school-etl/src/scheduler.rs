//! Run scheduler
//!
//! Fires the orchestrator on a fixed cadence. One run at a time: the next tick
//! is computed only after the current run finishes, and always from the
//! current time, so ticks missed while a run was in progress (or while the
//! process was down) are skipped rather than replayed.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Serialize, Serializer};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

use crate::orchestrator::Orchestrator;
use crate::run::RunContext;

/// Run cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Top of every hour (UTC)
    Hourly,
    /// Midnight UTC
    Daily,
    /// Fixed interval measured from the end of the previous run
    Every(Duration),
}

impl Schedule {
    /// Next tick strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Hourly => {
                let hour_start = now
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(now);
                hour_start + ChronoDuration::hours(1)
            },
            Schedule::Daily => {
                let tomorrow = now.date_naive() + ChronoDuration::days(1);
                tomorrow.and_time(NaiveTime::MIN).and_utc()
            },
            Schedule::Every(interval) => ChronoDuration::from_std(*interval)
                .ok()
                .and_then(|step| now.checked_add_signed(step))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Next tick at or after `not_before` when that is still ahead, otherwise after `now`
    pub fn next_tick(&self, now: DateTime<Utc>, not_before: DateTime<Utc>) -> DateTime<Utc> {
        if now >= not_before {
            return self.next_after(now);
        }
        match self {
            Schedule::Every(_) => not_before,
            _ if self.is_boundary(not_before) => not_before,
            _ => self.next_after(not_before),
        }
    }

    fn is_boundary(&self, at: DateTime<Utc>) -> bool {
        let on_hour = at.minute() == 0 && at.second() == 0 && at.nanosecond() == 0;
        match self {
            Schedule::Hourly => on_hour,
            Schedule::Daily => on_hour && at.hour() == 0,
            Schedule::Every(_) => true,
        }
    }
}

impl std::str::FromStr for Schedule {
    type Err = String;

    /// Accepts `@hourly`, `@daily` (or `@midnight`), and `every <n>s|m|h`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "@hourly" | "hourly" => return Ok(Schedule::Hourly),
            "@daily" | "daily" | "@midnight" => return Ok(Schedule::Daily),
            _ => {},
        }

        let spec = normalized
            .strip_prefix("every")
            .map(str::trim)
            .ok_or_else(|| format!("unknown schedule '{}'", s))?;

        let split = spec
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("schedule '{}' is missing a unit (s, m or h)", s))?;
        let (amount, unit) = spec.split_at(split);
        let amount: u64 = amount
            .parse()
            .map_err(|_| format!("schedule '{}' has no interval", s))?;

        let secs = match unit.trim() {
            "s" => amount,
            "m" => amount.saturating_mul(60),
            "h" => amount.saturating_mul(3600),
            other => return Err(format!("unknown interval unit '{}'", other)),
        };

        if secs == 0 {
            return Err("interval must be greater than zero".to_string());
        }

        Ok(Schedule::Every(Duration::from_secs(secs)))
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Hourly => write!(f, "@hourly"),
            Schedule::Daily => write!(f, "@daily"),
            Schedule::Every(interval) => write!(f, "every {}s", interval.as_secs()),
        }
    }
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Scheduler driving an orchestrator
pub struct Scheduler {
    schedule: Schedule,
    start_date: NaiveDate,
    orchestrator: Orchestrator,
}

impl Scheduler {
    pub fn new(schedule: Schedule, start_date: NaiveDate, orchestrator: Orchestrator) -> Self {
        Self {
            schedule,
            start_date,
            orchestrator,
        }
    }

    fn not_before(&self) -> DateTime<Utc> {
        self.start_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown while waiting for a tick returns at once. Shutdown during a
    /// run cancels it: the run future is dropped, so an open load transaction
    /// rolls back and the table keeps its previous contents.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(schedule = %self.schedule, start_date = %self.start_date, "Scheduler started");

        loop {
            let now = Utc::now();
            let tick = self.schedule.next_tick(now, self.not_before());
            let wait = (tick - now).to_std().unwrap_or(Duration::ZERO);

            info!(next_tick = %tick, wait_secs = wait.as_secs(), "Waiting for next tick");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = &mut shutdown => {
                    info!("Shutdown requested, scheduler stopping");
                    return;
                },
            }

            let ctx = RunContext::scheduled(tick);
            tokio::select! {
                outcome = self.orchestrator.run(&ctx) => {
                    match outcome {
                        Ok(report) => info!(
                            run_id = %report.run_id,
                            rows_loaded = report.rows_loaded,
                            "Scheduled run completed"
                        ),
                        Err(e) => error!(
                            run_id = %ctx.run_id,
                            kind = e.kind(),
                            error = %e,
                            "Scheduled run failed"
                        ),
                    }
                },
                _ = &mut shutdown => {
                    // Dropping the run future rolls back any open load transaction
                    info!(run_id = %ctx.run_id, "Shutdown requested, run cancelled");
                    return;
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!("@daily".parse::<Schedule>().unwrap(), Schedule::Daily);
        assert_eq!(" @Hourly ".parse::<Schedule>().unwrap(), Schedule::Hourly);
        assert_eq!(
            "every 90s".parse::<Schedule>().unwrap(),
            Schedule::Every(Duration::from_secs(90))
        );
        assert_eq!(
            "every 15m".parse::<Schedule>().unwrap(),
            Schedule::Every(Duration::from_secs(900))
        );
        assert_eq!(
            "every 2h".parse::<Schedule>().unwrap(),
            Schedule::Every(Duration::from_secs(7200))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["@weekly", "every", "every 10", "every 0s", "every 5d", "every s", "0 0 * * *"] {
            assert!(bad.parse::<Schedule>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_display_round_trips() {
        for schedule in [Schedule::Daily, Schedule::Hourly, Schedule::Every(Duration::from_secs(45))] {
            assert_eq!(schedule.to_string().parse::<Schedule>().unwrap(), schedule);
        }
    }

    #[test]
    fn test_daily_ticks_at_next_midnight() {
        assert_eq!(
            Schedule::Daily.next_after(at("2024-05-01T13:45:00Z")),
            at("2024-05-02T00:00:00Z")
        );
        assert_eq!(
            Schedule::Daily.next_after(at("2024-05-02T00:00:00Z")),
            at("2024-05-03T00:00:00Z")
        );
    }

    #[test]
    fn test_hourly_ticks_at_next_hour() {
        assert_eq!(
            Schedule::Hourly.next_after(at("2024-05-01T23:59:59.5Z")),
            at("2024-05-02T00:00:00Z")
        );
    }

    #[test]
    fn test_interval_ticks_from_now() {
        let schedule = Schedule::Every(Duration::from_secs(30));
        assert_eq!(
            schedule.next_after(at("2024-05-01T00:00:00Z")),
            at("2024-05-01T00:00:30Z")
        );
    }

    #[test]
    fn test_start_date_defers_first_tick() {
        let not_before = at("2030-01-01T00:00:00Z");
        let now = at("2029-06-15T08:00:00Z");

        assert_eq!(Schedule::Daily.next_tick(now, not_before), not_before);
        assert_eq!(
            Schedule::Every(Duration::from_secs(60)).next_tick(now, not_before),
            not_before
        );
    }

    #[test]
    fn test_past_start_date_has_no_catch_up() {
        let not_before = at("2024-05-01T00:00:00Z");
        let now = at("2026-10-18T10:00:00Z");

        assert_eq!(Schedule::Daily.next_tick(now, not_before), at("2026-10-19T00:00:00Z"));
    }

    struct UnreachableSource;

    #[async_trait::async_trait]
    impl crate::extract::Source for UnreachableSource {
        async fn fetch(&self) -> school_etl_common::Result<crate::models::RawPage> {
            panic!("scheduler must not fire before its first tick");
        }

        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    struct UnreachableSink;

    #[async_trait::async_trait]
    impl crate::load::Sink for UnreachableSink {
        async fn load(
            &self,
            _dataset: &crate::models::CleanDataset,
        ) -> school_etl_common::Result<crate::models::LoadResult> {
            panic!("scheduler must not fire before its first tick");
        }

        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_stops_without_running() {
        let orchestrator = Orchestrator::new(
            std::sync::Arc::new(UnreachableSource),
            crate::transform::Transformer::default(),
            std::sync::Arc::new(UnreachableSink),
            crate::orchestrator::RetryPolicy::none(),
        );
        let far_future = NaiveDate::from_ymd_opt(2999, 1, 1).unwrap();

        Scheduler::new(Schedule::Daily, far_future, orchestrator)
            .run_until(async {})
            .await;
    }

    #[test]
    fn test_serializes_as_string() {
        let encoded = serde_json::to_string(&Schedule::Every(Duration::from_secs(60))).unwrap();
        assert_eq!(encoded, "\"every 60s\"");
    }
}
