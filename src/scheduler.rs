//! Job table and run loop for the continuous mode.
//!
//! The [`Scheduler`] is a plain value owned by `main`. Every tick it asks the
//! table which jobs are due, runs them one at a time to completion, and goes
//! back to sleep. A job that panics is reported and followed by a pause; the
//! loop itself keeps going until Ctrl-C.

use crate::monitor::NewsMonitor;
use crate::notify::{self, Notifier};
use crate::sources::VideoSource;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// How often the table is checked for due jobs.
pub const TICK: Duration = Duration::from_secs(30);
/// Pause after a job panics before the loop resumes.
pub const ERROR_PAUSE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Poll,
    DailyPush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Every(TimeDelta),
    DailyAt(NaiveTime),
}

impl Cadence {
    fn next_after(self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Cadence::Every(interval) => now + interval,
            Cadence::DailyAt(at) => next_daily(now, at),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    job: Job,
    cadence: Cadence,
    next_run: DateTime<FixedOffset>,
}

/// First instant at `at` (read in `now`'s offset) strictly after `now`.
pub fn next_daily(now: DateTime<FixedOffset>, at: NaiveTime) -> DateTime<FixedOffset> {
    let offset = now.timezone();
    let candidate = now.date_naive().and_time(at);
    let candidate = if candidate > now.naive_local() {
        candidate
    } else {
        candidate + TimeDelta::days(1)
    };
    let utc = candidate - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    entries: Vec<Entry>,
    tick: Duration,
    error_pause: Duration,
}

impl Scheduler {
    /// Poll every `poll_every_minutes`, plus the daily push at `push_at` when
    /// given. First runs are computed from `now`.
    pub fn new(
        poll_every_minutes: u64,
        push_at: Option<NaiveTime>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let interval = i64::try_from(poll_every_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::days(1));
        let mut entries = vec![Entry {
            job: Job::Poll,
            cadence: Cadence::Every(interval),
            next_run: now,
        }];
        if let Some(at) = push_at {
            entries.push(Entry {
                job: Job::DailyPush,
                cadence: Cadence::DailyAt(at),
                next_run: now,
            });
        }
        for entry in &mut entries {
            entry.next_run = entry.cadence.next_after(now);
        }
        Self {
            entries,
            tick: TICK,
            error_pause: ERROR_PAUSE,
        }
    }

    #[cfg(test)]
    pub fn with_pauses(mut self, tick: Duration, error_pause: Duration) -> Self {
        self.tick = tick;
        self.error_pause = error_pause;
        self
    }

    pub fn next_run(&self, job: Job) -> Option<DateTime<FixedOffset>> {
        self.entries
            .iter()
            .find(|e| e.job == job)
            .map(|e| e.next_run)
    }

    /// Jobs whose next run is at or before `now`, in table order. Each
    /// returned job is rescheduled from `now`.
    pub fn due_jobs(&mut self, now: DateTime<FixedOffset>) -> Vec<Job> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.next_run <= now {
                due.push(entry.job);
                entry.next_run = entry.cadence.next_after(now);
                debug!(job = ?entry.job, next_run = %entry.next_run, "Rescheduled job");
            }
        }
        due
    }

    /// Announce startup, run an initial poll, then loop until Ctrl-C and
    /// announce shutdown.
    #[instrument(level = "info", skip_all)]
    pub async fn run<S: VideoSource, N: Notifier>(
        &mut self,
        monitor: &NewsMonitor<S, N>,
        offset: FixedOffset,
    ) {
        let now = || Utc::now().with_timezone(&offset);
        let settings = monitor.settings();
        info!(
            interval_minutes = settings.check_interval_minutes,
            daily_push = settings.daily_push_enabled,
            "Scheduler starting"
        );
        monitor
            .notifier()
            .send_plain(&notify::startup_notice(
                settings.check_interval_minutes,
                &settings.creator_label,
                &now(),
            ))
            .await;

        self.run_job(monitor, Job::Poll, now()).await;

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received interrupt signal");
                    break;
                }
                _ = tokio::time::sleep(self.tick) => {
                    for job in self.due_jobs(now()) {
                        self.run_job(monitor, job, now()).await;
                    }
                }
            }
        }

        info!("Stopping scheduler");
        self.entries.clear();
        monitor
            .notifier()
            .send_plain(&notify::shutdown_notice(&now()))
            .await;
    }

    /// Run one job, containing any panic it raises.
    pub async fn run_job<S: VideoSource, N: Notifier>(
        &self,
        monitor: &NewsMonitor<S, N>,
        job: Job,
        now: DateTime<FixedOffset>,
    ) {
        info!(?job, %now, "Running scheduled job");
        let outcome = match job {
            Job::Poll => AssertUnwindSafe(monitor.poll_cycle(now))
                .catch_unwind()
                .await
                .map(|report| debug!(?report, "Poll finished")),
            Job::DailyPush => AssertUnwindSafe(monitor.daily_push(now))
                .catch_unwind()
                .await
                .map(|outcome| debug!(?outcome, "Daily push finished")),
        };
        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            error!(?job, %message, "Scheduled job panicked");
            monitor
                .notifier()
                .send_plain(&notify::error_notice(&message))
                .await;
            tokio::time::sleep(self.error_pause).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
