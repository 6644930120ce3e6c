//! Background billing jobs
//!
//! A single task ticks on a `tokio::time::interval`, runs every job whose
//! cron schedule has come due, and retries failures with exponential
//! backoff. Cron expressions carry a seconds field and are evaluated in the
//! business timezone.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use cron::Schedule;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use core_kernel::{Actor, Timezone};
use domain_billing::{BillingError, BillingService};

use crate::config::ApiConfig;

/// Failed runs are retried at most this many times before waiting for
/// the next scheduled run
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; each further retry doubles it
pub const RETRY_BASE_SECS: i64 = 60;

/// Delay before retry number `attempt` (1-based): 60 s, 120 s, 240 s
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::seconds(RETRY_BASE_SECS * 2_i64.pow(attempt.saturating_sub(1)))
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression for {job}: {source}")]
    InvalidCron {
        job: &'static str,
        #[source]
        source: cron::error::Error,
    },

    #[error("Cron expression for {job} has no upcoming run")]
    NoUpcomingRun { job: &'static str },
}

/// The scheduled billing jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Recurring invoice generation
    GenerateMonthly,
    /// Open/partial invoices past due become overdue
    MarkOverdue,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::GenerateMonthly => "generate_monthly_invoices",
            Job::MarkOverdue => "mark_overdue_invoices",
        }
    }

    /// Runs the job for the business date `today`; returns the number of
    /// invoices created or updated
    pub async fn run(&self, billing: &BillingService, today: NaiveDate) -> Result<u64, BillingError> {
        match self {
            Job::GenerateMonthly => {
                let created = billing.generate_monthly_invoices(&Actor::system(), today).await?;
                Ok(created as u64)
            }
            Job::MarkOverdue => billing.mark_overdue_invoices(today).await,
        }
    }
}

/// Result of one job attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job: Job,
    pub run_date: NaiveDate,
    pub result: Result<u64, String>,
    /// When the job will next run
    pub next_run: DateTime<Utc>,
}

#[derive(Debug)]
struct ScheduledJob {
    job: Job,
    schedule: Schedule,
    next_run: DateTime<Utc>,
    retries: u32,
    /// Business date of a run being retried
    pending_date: Option<NaiveDate>,
}

impl ScheduledJob {
    fn new(job: Job, expression: &str, tz: &Timezone, now: DateTime<Utc>) -> Result<Self, SchedulerError> {
        let schedule = Schedule::from_str(expression)
            .map_err(|source| SchedulerError::InvalidCron { job: job.name(), source })?;
        let next_run = upcoming(&schedule, tz, now).ok_or(SchedulerError::NoUpcomingRun { job: job.name() })?;
        Ok(Self {
            job,
            schedule,
            next_run,
            retries: 0,
            pending_date: None,
        })
    }
}

fn upcoming(schedule: &Schedule, tz: &Timezone, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz.0))
        .next()
        .map(|at| at.with_timezone(&Utc))
}

/// Runs the billing jobs on their cron schedules
pub struct Scheduler {
    billing: BillingService,
    jobs: Vec<ScheduledJob>,
    tick: std::time::Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.jobs)
            .field("tick", &self.tick)
            .finish()
    }
}

impl Scheduler {
    /// Schedules both jobs from their cron expressions, starting after `now`
    pub fn new(
        billing: BillingService,
        generate_cron: &str,
        overdue_cron: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        let tz = *billing.timezone();
        let jobs = vec![
            ScheduledJob::new(Job::GenerateMonthly, generate_cron, &tz, now)?,
            ScheduledJob::new(Job::MarkOverdue, overdue_cron, &tz, now)?,
        ];
        Ok(Self {
            billing,
            jobs,
            tick: std::time::Duration::from_secs(30),
        })
    }

    pub fn from_config(billing: BillingService, config: &ApiConfig) -> Result<Self, SchedulerError> {
        Self::new(billing, &config.generate_cron, &config.overdue_cron, Utc::now())
    }

    /// Sets how often due jobs are checked
    pub fn with_tick(mut self, tick: std::time::Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn next_run(&self, job: Job) -> Option<DateTime<Utc>> {
        self.jobs.iter().find(|j| j.job == job).map(|j| j.next_run)
    }

    /// Runs every job due at `now` and reschedules it
    pub async fn run_due(&mut self, now: DateTime<Utc>) -> Vec<JobRun> {
        let tz = *self.billing.timezone();
        let mut runs = Vec::new();

        for scheduled in self.jobs.iter_mut().filter(|j| j.next_run <= now) {
            let run_date = scheduled
                .pending_date
                .unwrap_or_else(|| tz.local_date(scheduled.next_run));

            let result = scheduled.job.run(&self.billing, run_date).await;
            let next_scheduled = upcoming(&scheduled.schedule, &tz, now);

            match &result {
                Ok(affected) => {
                    info!(job = scheduled.job.name(), %run_date, affected, "Scheduled job completed");
                    scheduled.retries = 0;
                    scheduled.pending_date = None;
                }
                Err(err) if scheduled.retries < MAX_RETRIES => {
                    scheduled.retries += 1;
                    scheduled.pending_date = Some(run_date);
                    warn!(
                        job = scheduled.job.name(),
                        %run_date,
                        error = %err,
                        attempt = scheduled.retries,
                        max_retries = MAX_RETRIES,
                        "Scheduled job failed, will retry"
                    );
                }
                Err(err) => {
                    error!(
                        job = scheduled.job.name(),
                        %run_date,
                        error = %err,
                        "Scheduled job failed after {} retries",
                        MAX_RETRIES
                    );
                    scheduled.retries = 0;
                    scheduled.pending_date = None;
                }
            }

            scheduled.next_run = if scheduled.pending_date.is_some() {
                now + retry_delay(scheduled.retries)
            } else {
                // An exhausted cron iterator only happens for expressions with an
                // explicit final year; park the job far in the future.
                next_scheduled.unwrap_or(DateTime::<Utc>::MAX_UTC)
            };

            runs.push(JobRun {
                job: scheduled.job,
                run_date,
                result: result.map_err(|e| e.to_string()),
                next_run: scheduled.next_run,
            });
        }
        runs
    }

    /// Starts the scheduler loop on the runtime
    pub fn spawn(mut self) -> JoinHandle<()> {
        info!(
            tick_secs = self.tick.as_secs(),
            generate_next = ?self.next_run(Job::GenerateMonthly),
            overdue_next = ?self.next_run(Job::MarkOverdue),
            "Starting billing scheduler"
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.run_due(Utc::now()).await;
            }
        })
    }
}
