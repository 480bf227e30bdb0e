// src/bot/jobs.rs - Periodic handler scheduling bound to the connection lifecycle

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::bot::hooks::{Handler, JobContext};
use crate::irc::Client;

#[derive(Debug, Default)]
struct JobCounters {
    runs: AtomicU64,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

struct RunningJob {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Job {
    handler: Arc<Handler>,
    interval: Duration,
    counters: Arc<JobCounters>,
    running: Option<RunningJob>,
    /// Gone from the handler set while running; dropped once stopped
    retired: bool,
}

impl Job {
    fn new(handler: Arc<Handler>, interval: Duration) -> Self {
        Self {
            handler,
            interval,
            counters: Arc::new(JobCounters::default()),
            running: None,
            retired: false,
        }
    }

    fn name(&self) -> &str {
        self.handler.name()
    }

    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.task.is_finished())
    }
}

/// Snapshot of one job for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub name: String,
    pub interval_secs: f64,
    pub running: bool,
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// Interval of a handler that can be scheduled
fn schedulable(handler: &Handler) -> Option<Duration> {
    let Some(interval) = handler.interval() else {
        warn!("Handler '{}' is not periodic, not scheduling it", handler.name());
        return None;
    };
    if interval.is_zero() {
        warn!("Periodic handler '{}' has a zero interval, not scheduling it", handler.name());
        return None;
    }
    Some(interval)
}

/// Owns the background task of every periodic handler.
///
/// Jobs are keyed by handler name. A running job is never restarted or
/// replaced, so reloading hooks never doubles up scheduled work.
pub struct JobSupervisor {
    client: Client,
    jobs: Mutex<Vec<Job>>,
}

impl JobSupervisor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Track a periodic handler. Returns false when it was not added.
    pub async fn register(&self, handler: Arc<Handler>) -> bool {
        let Some(interval) = schedulable(&handler) else {
            return false;
        };

        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|job| job.name() == handler.name()) {
            warn!("Periodic handler '{}' is already scheduled, ignoring the new one", handler.name());
            return false;
        }

        debug!("Registered periodic handler '{}' every {:?}", handler.name(), interval);
        jobs.push(Job::new(handler, interval));
        true
    }

    /// Bring the job list in line with a freshly loaded set of periodic handlers.
    ///
    /// Running jobs keep their handler. Idle jobs take the new handler and
    /// interval of the same name, idle jobs whose name is gone are dropped,
    /// and running ones whose name is gone are dropped when they stop. Returns
    /// how many jobs were added.
    pub async fn sync(&self, handlers: &[Arc<Handler>]) -> usize {
        let mut wanted: Vec<(Arc<Handler>, Duration)> = Vec::new();
        for handler in handlers {
            let Some(interval) = schedulable(handler) else {
                continue;
            };
            if wanted.iter().any(|(kept, _)| kept.name() == handler.name()) {
                warn!("Periodic handler '{}' is defined more than once, keeping the first", handler.name());
                continue;
            }
            wanted.push((Arc::clone(handler), interval));
        }

        let mut jobs = self.jobs.lock().await;
        jobs.retain(|job| {
            let keep = job.is_running() || wanted.iter().any(|(handler, _)| handler.name() == job.name());
            if !keep {
                debug!("Dropped periodic job '{}'", job.name());
            }
            keep
        });

        for job in jobs.iter_mut() {
            job.retired = !wanted.iter().any(|(handler, _)| handler.name() == job.name());
        }

        let mut added = 0;
        for (handler, interval) in wanted {
            match jobs.iter_mut().find(|job| job.name() == handler.name()) {
                Some(job) if job.is_running() => {
                    debug!("Periodic job '{}' is running, keeping its handler", job.name());
                }
                Some(job) => {
                    job.handler = handler;
                    job.interval = interval;
                }
                None => {
                    debug!("Registered periodic handler '{}' every {:?}", handler.name(), interval);
                    jobs.push(Job::new(handler, interval));
                    added += 1;
                }
            }
        }
        added
    }

    /// Start every job that is not already running; returns how many started
    pub async fn start_all(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let mut started = 0;

        for job in jobs.iter_mut().filter(|job| !job.is_running() && !job.retired) {
            let running = self.spawn(job);
            job.running = Some(running);
            started += 1;
        }

        if started > 0 {
            info!("Started {} periodic jobs", started);
        }
        started
    }

    fn spawn(&self, job: &Job) -> RunningJob {
        let (stop, mut stopped) = oneshot::channel();
        let client = self.client.clone();
        let handler = Arc::clone(&job.handler);
        let counters = Arc::clone(&job.counters);
        let period = job.interval;

        let task = tokio::spawn(async move {
            let Some(callback) = handler.job_callback().cloned() else {
                return;
            };
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let run = counters.runs.fetch_add(1, Ordering::SeqCst) + 1;
                        *counters.last_run.write().await = Some(Utc::now());

                        let ctx = JobContext {
                            client: client.clone(),
                            job: handler.name().to_string(),
                            run,
                        };
                        if let Err(e) = callback(ctx).await {
                            error!("Periodic handler '{}' failed on run {}: {:#}", handler.name(), run, e);
                        }
                    }
                }
            }

            debug!("Periodic job '{}' stopped", handler.name());
        });

        RunningJob { stop, task }
    }

    /// Stop every running job and wait until each task has finished
    pub async fn stop_all(&self) {
        let running = {
            let mut jobs = self.jobs.lock().await;
            let running: Vec<(String, RunningJob)> = jobs
                .iter_mut()
                .filter_map(|job| job.running.take().map(|r| (job.name().to_string(), r)))
                .collect();
            jobs.retain(|job| !job.retired);
            running
        };

        if running.is_empty() {
            return;
        }

        let count = running.len();
        for (name, job) in running {
            // The task may already have exited on its own
            let _ = job.stop.send(());
            if let Err(e) = job.task.await {
                error!("Periodic job '{}' ended abnormally: {}", name, e);
            }
        }
        info!("Stopped {} periodic jobs", count);
    }

    pub async fn stats(&self) -> Vec<JobStats> {
        let jobs = self.jobs.lock().await;
        let mut stats = Vec::with_capacity(jobs.len());

        for job in jobs.iter() {
            stats.push(JobStats {
                name: job.name().to_string(),
                interval_secs: job.interval.as_secs_f64(),
                running: job.is_running(),
                runs: job.counters.runs.load(Ordering::SeqCst),
                last_run: *job.counters.last_run.read().await,
            });
        }
        stats
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn running(&self) -> usize {
        self.jobs.lock().await.iter().filter(|job| job.is_running()).count()
    }
}
