// =============================================================================
// Job Scheduler — interval jobs + daily cron with run statistics
// =============================================================================
//
// Five interval jobs (data collection, indicator calc, scoring, buy
// execution, risk check) plus one daily cron (post-trade feedback at 00:30
// KST). The engine drives a cooperative tick loop: each tick it asks for the
// due jobs and runs them inline, one at a time, so at most one instance of
// any job is ever in flight.
//
// Policy per job:
//   - Coalescing: when several intervals were missed, the job runs once and
//     the next deadline restarts from now.
//   - Misfire grace: a job dispatched more than 60 s past its deadline is
//     logged as a misfire but still runs.
//
// Pause semantics: a paused engine keeps collecting data and checking risk;
// only buy execution is skipped. The daily-loss halt gates buy execution the
// same way.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::IntervalConfig;

/// How far past its deadline a job may run before it counts as a misfire.
const MISFIRE_GRACE: Duration = Duration::from_secs(60);

/// KST wall-clock time of the daily feedback job.
const DAILY_FEEDBACK_HOUR: u32 = 0;
const DAILY_FEEDBACK_MINUTE: u32 = 30;

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid fixed offset")
}

/// The six scheduled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobId {
    CollectData,
    CalcIndicators,
    Scoring,
    ExecuteBuy,
    RiskCheck,
    DailyFeedback,
}

impl JobId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectData => "collect_data",
            Self::CalcIndicators => "calc_indicators",
            Self::Scoring => "scoring",
            Self::ExecuteBuy => "execute_buy",
            Self::RiskCheck => "risk_check",
            Self::DailyFeedback => "daily_feedback",
        }
    }

    /// Buy execution is the only job gated by pause and the daily-loss halt.
    pub fn is_entry_job(&self) -> bool {
        matches!(self, Self::ExecuteBuy)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Configured,
    Idle,
    Running,
    Error,
}

/// Per-job run statistics exposed through the status API.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub runs: u64,
    pub errors: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

impl Default for JobStats {
    fn default() -> Self {
        Self {
            runs: 0,
            errors: 0,
            last_run: None,
            next_run: None,
            status: JobStatus::Configured,
        }
    }
}

enum Schedule {
    Interval(chrono::Duration),
    DailyKst { hour: u32, minute: u32 },
}

struct JobSlot {
    id: JobId,
    schedule: Schedule,
    next_due: DateTime<Utc>,
}

pub struct Scheduler {
    slots: Mutex<Vec<JobSlot>>,
    stats: Mutex<HashMap<JobId, JobStats>>,
}

/// Next occurrence of `hour:minute` KST strictly after `now`.
fn next_daily_kst(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let local = now.with_timezone(&kst());
    let target_time = NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time");
    let mut candidate = local.date_naive().and_time(target_time);
    if candidate <= local.naive_local() {
        candidate += chrono::Duration::days(1);
    }
    candidate
        .and_local_timezone(kst())
        .single()
        .expect("fixed offset is unambiguous")
        .with_timezone(&Utc)
}

impl Scheduler {
    pub fn new(intervals: &IntervalConfig) -> Self {
        let now = Utc::now();
        Self::with_start(intervals, now)
    }

    fn with_start(intervals: &IntervalConfig, now: DateTime<Utc>) -> Self {
        let interval_jobs = [
            (JobId::CollectData, intervals.data_collection_min),
            (JobId::CalcIndicators, intervals.indicator_calc_min),
            (JobId::Scoring, intervals.scoring_min),
            (JobId::ExecuteBuy, intervals.buy_execution_min),
            (JobId::RiskCheck, intervals.risk_check_min),
        ];

        let mut slots = Vec::with_capacity(interval_jobs.len() + 1);
        let mut stats = HashMap::new();

        for (id, minutes) in interval_jobs {
            let interval = chrono::Duration::minutes(minutes.max(1) as i64);
            let next_due = now + interval;
            slots.push(JobSlot {
                id,
                schedule: Schedule::Interval(interval),
                next_due,
            });
            stats.insert(
                id,
                JobStats {
                    next_run: Some(next_due),
                    ..JobStats::default()
                },
            );
        }

        let cron_due = next_daily_kst(now, DAILY_FEEDBACK_HOUR, DAILY_FEEDBACK_MINUTE);
        slots.push(JobSlot {
            id: JobId::DailyFeedback,
            schedule: Schedule::DailyKst {
                hour: DAILY_FEEDBACK_HOUR,
                minute: DAILY_FEEDBACK_MINUTE,
            },
            next_due: cron_due,
        });
        stats.insert(
            JobId::DailyFeedback,
            JobStats {
                next_run: Some(cron_due),
                ..JobStats::default()
            },
        );

        info!(jobs = slots.len(), "scheduler initialised");

        Self {
            slots: Mutex::new(slots),
            stats: Mutex::new(stats),
        }
    }

    /// Collect the jobs due at `now` and advance their deadlines.
    ///
    /// A deadline more than one whole interval in the past collapses into a
    /// single run (coalescing); the fresh deadline always counts from `now`.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let mut due = Vec::new();
        let mut slots = self.slots.lock();

        for slot in slots.iter_mut() {
            if slot.next_due > now {
                continue;
            }

            let late = (now - slot.next_due)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if late > MISFIRE_GRACE {
                warn!(
                    job = %slot.id,
                    late_secs = late.as_secs(),
                    "job misfired past grace; running a single make-up"
                );
            }

            slot.next_due = match &slot.schedule {
                Schedule::Interval(interval) => now + *interval,
                Schedule::DailyKst { hour, minute } => next_daily_kst(now, *hour, *minute),
            };
            due.push(slot.id);

            if let Some(stats) = self.stats.lock().get_mut(&slot.id) {
                stats.next_run = Some(slot.next_due);
            }
        }

        due
    }

    // -------------------------------------------------------------------------
    // Stats bookkeeping
    // -------------------------------------------------------------------------

    pub fn mark_running(&self, id: JobId) {
        if let Some(stats) = self.stats.lock().get_mut(&id) {
            stats.status = JobStatus::Running;
        }
    }

    pub fn record_success(&self, id: JobId) {
        if let Some(stats) = self.stats.lock().get_mut(&id) {
            stats.runs += 1;
            stats.last_run = Some(Utc::now());
            stats.status = JobStatus::Idle;
        }
    }

    pub fn record_error(&self, id: JobId) {
        if let Some(stats) = self.stats.lock().get_mut(&id) {
            stats.runs += 1;
            stats.errors += 1;
            stats.last_run = Some(Utc::now());
            stats.status = JobStatus::Error;
        }
    }

    /// Snapshot of all job statistics.
    pub fn stats(&self) -> HashMap<JobId, JobStats> {
        self.stats.lock().clone()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn intervals() -> IntervalConfig {
        IntervalConfig::default()
    }

    #[test]
    fn nothing_due_immediately() {
        let now = Utc::now();
        let scheduler = Scheduler::with_start(&intervals(), now);
        assert!(scheduler.due_jobs(now).is_empty());
    }

    #[test]
    fn jobs_become_due_after_their_interval() {
        let start = Utc::now();
        let scheduler = Scheduler::with_start(&intervals(), start);

        // After 5 minutes the two 5-minute jobs are due.
        let now = start + chrono::Duration::minutes(5);
        let due = scheduler.due_jobs(now);
        assert!(due.contains(&JobId::CollectData));
        assert!(due.contains(&JobId::RiskCheck));
        assert!(!due.contains(&JobId::Scoring));

        // Immediately asking again yields nothing (deadline advanced).
        assert!(scheduler.due_jobs(now).is_empty());
    }

    #[test]
    fn missed_runs_coalesce_into_one() {
        let start = Utc::now();
        let scheduler = Scheduler::with_start(&intervals(), start);

        // 27 minutes late: five 5-minute windows elapsed, a single run fires.
        let now = start + chrono::Duration::minutes(27);
        let due = scheduler.due_jobs(now);
        assert_eq!(
            due.iter().filter(|id| **id == JobId::CollectData).count(),
            1
        );

        // The next deadline counts from now, not from the missed slots.
        let again = scheduler.due_jobs(now + chrono::Duration::minutes(4));
        assert!(!again.contains(&JobId::CollectData));
        let later = scheduler.due_jobs(now + chrono::Duration::minutes(5));
        assert!(later.contains(&JobId::CollectData));
    }

    #[test]
    fn daily_cron_targets_0030_kst() {
        // 2024-03-01 23:00 UTC = 2024-03-02 08:00 KST, so the next 00:30 KST
        // is on 2024-03-03, i.e. 2024-03-02 15:30 UTC.
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        let next = next_daily_kst(now, 0, 30);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 15, 30, 0).unwrap());
    }

    #[test]
    fn daily_cron_same_day_when_before_target() {
        // 14:00 UTC = 23:00 KST; next 00:30 KST is 15:30 UTC the same day.
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        let next = next_daily_kst(now, 0, 30);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap());
    }

    #[test]
    fn stats_track_runs_and_errors() {
        let scheduler = Scheduler::new(&intervals());
        scheduler.mark_running(JobId::Scoring);
        assert_eq!(scheduler.stats()[&JobId::Scoring].status, JobStatus::Running);

        scheduler.record_success(JobId::Scoring);
        scheduler.record_error(JobId::Scoring);

        let stats = scheduler.stats();
        let scoring = &stats[&JobId::Scoring];
        assert_eq!(scoring.runs, 2);
        assert_eq!(scoring.errors, 1);
        assert_eq!(scoring.status, JobStatus::Error);
        assert!(scoring.last_run.is_some());
        assert!(scoring.next_run.is_some());
    }

    #[test]
    fn only_buy_execution_is_an_entry_job() {
        assert!(JobId::ExecuteBuy.is_entry_job());
        assert!(!JobId::RiskCheck.is_entry_job());
        assert!(!JobId::CollectData.is_entry_job());
        assert!(!JobId::DailyFeedback.is_entry_job());
    }
}
