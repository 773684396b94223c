//! In-memory one-shot job scheduler.
//!
//! The scheduler owns no durable state: its job table is a cache rebuilt at
//! startup from the store. A single engine task sleeps until the earliest due
//! time (or until a schedule/cancel wakes it) and hands due jobs to the
//! [`JobHandler`] one at a time, in `(run_at, insertion)` order.
//!
//! A panicking handler is logged and the engine moves on to the next job.
//!
//! Jobs evaluated more than `misfire_grace` after their `run_at` are dropped
//! without running the handler. This is a silent-loss policy: a process that
//! was down for longer than the grace window never fires the missed jobs.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::panic_message;
use crate::scheduler::job::{Job, JobHandler, JobId};
use crate::scheduler::table::JobTable;

/// State shared between the scheduler handle and its engine task.
struct Shared<P> {
    table: Mutex<JobTable<P>>,
    wake: Notify,
    stopped: AtomicBool,
}

impl<P> Shared<P> {
    fn table(&self) -> MutexGuard<'_, JobTable<P>> {
        // The table is never left half-updated, so a poisoned lock is still usable.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One-shot job scheduler keyed by [`JobId`].
pub struct Scheduler<P: Send + 'static> {
    shared: Arc<Shared<P>>,
    handler: Arc<dyn JobHandler<P>>,
    clock: Arc<dyn Clock>,
    misfire_grace: Duration,
    started: AtomicBool,
}

impl<P: Send + 'static> Scheduler<P> {
    /// Create a stopped scheduler. Jobs may be scheduled before `start()`.
    pub fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        handler: Arc<dyn JobHandler<P>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(JobTable::new()),
                wake: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
            handler,
            clock,
            misfire_grace: config.misfire_grace,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the engine task. Calling it again, or after `shutdown()`, is a
    /// no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let engine = Engine {
            shared: Arc::clone(&self.shared),
            handler: Arc::clone(&self.handler),
            clock: Arc::clone(&self.clock),
            misfire_grace: chrono::Duration::from_std(self.misfire_grace)
                .unwrap_or(chrono::Duration::MAX),
        };
        tokio::spawn(engine.run());
        info!(
            grace_secs = self.misfire_grace.as_secs(),
            jobs = self.job_count(),
            "Scheduler started"
        );
    }

    /// Schedule `payload` to fire at `run_at`, replacing any pending job with
    /// the same id. A `run_at` in the past fires as soon as the engine runs,
    /// unless it is already outside the misfire grace window.
    pub fn schedule_once(&self, id: JobId, run_at: DateTime<Utc>, payload: P) {
        let replaced = self.shared.table().upsert(id.clone(), run_at, payload);
        debug!(job = %id, run_at = %run_at, replaced, "Job scheduled");
        self.shared.wake.notify_one();
    }

    /// Remove a pending job. Returns whether a job was removed; an unknown id
    /// is not an error.
    pub fn cancel(&self, id: &JobId) -> bool {
        let removed = self.shared.table().remove(id).is_some();
        if removed {
            debug!(job = %id, "Job cancelled");
            self.shared.wake.notify_one();
        }
        removed
    }

    pub fn has_job(&self, id: &JobId) -> bool {
        self.shared.table().contains(id)
    }

    /// Due time of a pending job.
    pub fn next_run_at(&self, id: &JobId) -> Option<DateTime<Utc>> {
        self.shared.table().run_at(id)
    }

    pub fn job_count(&self) -> usize {
        self.shared.table().len()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Stop evaluating jobs. Does not wait for, or cancel, a handler that is
    /// already running; it finishes (or fails) on its own.
    pub fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.wake.notify_one();
        info!("Scheduler stopped");
    }
}

/// What the engine does next.
enum Step<P> {
    Fire(Job<P>),
    Sleep(Option<DateTime<Utc>>),
}

struct Engine<P: Send + 'static> {
    shared: Arc<Shared<P>>,
    handler: Arc<dyn JobHandler<P>>,
    clock: Arc<dyn Clock>,
    misfire_grace: chrono::Duration,
}

impl<P: Send + 'static> Engine<P> {
    async fn run(self) {
        loop {
            if self.shared.stopped.load(Ordering::SeqCst) {
                break;
            }

            let now = self.clock.now();
            let step = {
                let mut table = self.shared.table();
                match table.pop_due(now) {
                    Some(job) => Step::Fire(job),
                    None => Step::Sleep(table.next_due()),
                }
            };

            match step {
                Step::Fire(job) => {
                    let lateness = now - job.run_at;
                    if lateness > self.misfire_grace {
                        warn!(
                            job = %job.id,
                            run_at = %job.run_at,
                            late_secs = lateness.num_seconds(),
                            "Job missed its grace window; dropped"
                        );
                        continue;
                    }
                    let id = job.id.clone();
                    debug!(job = %id, "Firing job");
                    if let Err(panic) = AssertUnwindSafe(self.handler.run(job)).catch_unwind().await {
                        error!(
                            job = %id,
                            panic = %panic_message(panic.as_ref()),
                            "Job handler panicked"
                        );
                    }
                }
                Step::Sleep(Some(due)) => {
                    let delay = (due - now).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shared.wake.notified() => {}
                    }
                }
                Step::Sleep(None) => self.shared.wake.notified().await,
            }
        }
        debug!("Scheduler engine exited");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::clock::TokioClock;

    #[derive(Default)]
    struct Recorder {
        fired: StdMutex<Vec<(String, DateTime<Utc>, &'static str)>>,
        clock: StdMutex<Option<TokioClock>>,
    }

    #[async_trait]
    impl JobHandler<&'static str> for Recorder {
        async fn run(&self, job: Job<&'static str>) {
            let now = self
                .clock
                .lock()
                .unwrap()
                .map(|c| c.now())
                .unwrap_or(job.run_at);
            self.fired
                .lock()
                .unwrap()
                .push((job.id.to_string(), now, job.payload));
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn scheduler(grace_secs: u64) -> (Scheduler<&'static str>, Arc<Recorder>, TokioClock) {
        let clock = TokioClock::starting_at(base());
        let recorder = Arc::new(Recorder::default());
        *recorder.clock.lock().unwrap() = Some(clock);
        let scheduler = Scheduler::new(
            SchedulerConfig {
                misfire_grace: Duration::from_secs(grace_secs),
            },
            Arc::new(clock),
            recorder.clone(),
        );
        (scheduler, recorder, clock)
    }

    fn fired(recorder: &Recorder) -> Vec<(String, DateTime<Utc>, &'static str)> {
        recorder.fired.lock().unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_due_time() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.start();
        scheduler.schedule_once(JobId::new("a"), base() + chrono::Duration::minutes(10), "a");

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(fired(&recorder).is_empty());
        assert!(scheduler.has_job(&JobId::new("a")));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fired = fired(&recorder);
        let due = base() + chrono::Duration::minutes(10);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "a");
        assert!(fired[0].1 >= due && fired[0].1 < due + chrono::Duration::seconds(1));
        assert!(!scheduler.has_job(&JobId::new("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_keeps_one_job_at_latest_time() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.start();
        let id = JobId::reminder(7);
        scheduler.schedule_once(id.clone(), base() + chrono::Duration::seconds(30), "first");
        scheduler.schedule_once(id.clone(), base() + chrono::Duration::seconds(90), "second");

        assert_eq!(scheduler.job_count(), 1);
        assert_eq!(
            scheduler.next_run_at(&id),
            Some(base() + chrono::Duration::seconds(90))
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        let fired = fired(&recorder);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].2, "second");
        assert!(fired[0].1 >= base() + chrono::Duration::seconds(90));
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_scheduled_before_start_fire_after_start() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.schedule_once(JobId::new("early"), base() + chrono::Duration::seconds(5), "x");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fired(&recorder).is_empty());

        // 5 seconds late, inside the grace window.
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired(&recorder).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn past_job_within_grace_fires_immediately() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.start();
        scheduler.schedule_once(JobId::new("late"), base() - chrono::Duration::seconds(30), "late");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired(&recorder).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn past_job_outside_grace_is_dropped() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.start();
        let id = JobId::new("stale");
        scheduler.schedule_once(id.clone(), base() - chrono::Duration::seconds(3600), "stale");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired(&recorder).is_empty());
        assert!(!scheduler.has_job(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_window_is_configurable() {
        let (scheduler, recorder, _) = scheduler(7200);
        scheduler.start();
        scheduler.schedule_once(JobId::new("old"), base() - chrono::Duration::seconds(3600), "old");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired(&recorder).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.start();
        let id = JobId::new("c");
        scheduler.schedule_once(id.clone(), base() + chrono::Duration::seconds(10), "c");

        assert!(scheduler.cancel(&id));
        assert!(!scheduler.cancel(&id));
        assert!(!scheduler.cancel(&JobId::new("never-existed")));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(fired(&recorder).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_in_due_order() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.schedule_once(JobId::new("second"), base() + chrono::Duration::seconds(20), "2");
        scheduler.schedule_once(JobId::new("first"), base() + chrono::Duration::seconds(10), "1");
        scheduler.schedule_once(JobId::new("tie"), base() + chrono::Duration::seconds(20), "3");
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let payloads: Vec<&str> = fired(&recorder).iter().map(|f| f.2).collect();
        assert_eq!(payloads, vec!["1", "2", "3"]);
    }

    struct Explosive {
        fired: StdMutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl JobHandler<&'static str> for Explosive {
        async fn run(&self, job: Job<&'static str>) {
            if job.payload == "bad" {
                panic!("handler bug");
            }
            self.fired.lock().unwrap().push(job.payload);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_handler_does_not_stop_the_engine() {
        let handler = Arc::new(Explosive {
            fired: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(
            SchedulerConfig::default(),
            Arc::new(TokioClock::starting_at(base())),
            handler.clone(),
        );
        scheduler.schedule_once(JobId::new("bad"), base() + chrono::Duration::seconds(1), "bad");
        scheduler.schedule_once(JobId::new("good"), base() + chrono::Duration::seconds(2), "good");
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*handler.fired.lock().unwrap(), vec!["good"]);
        assert_eq!(scheduler.job_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_shutdown_stops_firing() {
        let (scheduler, recorder, _) = scheduler(60);
        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.schedule_once(JobId::new("after"), base() + chrono::Duration::seconds(10), "x");
        scheduler.shutdown();
        assert!(!scheduler.is_running());
        scheduler.start();
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(fired(&recorder).is_empty());
        // The job stays in the table; only evaluation stopped.
        assert!(scheduler.has_job(&JobId::new("after")));
    }
}
