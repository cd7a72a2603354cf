//! Background job worker with lease heartbeats and retry handling.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use jobkeeper_queue::JobQueue;
use jobkeeper_scheduler::{JobHandle, JobStatus, SchedulerError, SchedulerService};
use jobkeeper_store::JobStore;

use crate::config::WorkerConfig;
use crate::outcome::{JobContext, JobOutcome};

/// Job logic, keyed by job name.
pub type JobHandler = Box<dyn Fn(&mut JobContext) -> JobOutcome + Send + Sync>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// How one claimed job was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    /// Rescheduled after the given delay
    Retried(Duration),
    Dead,
    /// Lease lost or payload deleted while running; nothing was written
    Abandoned,
    /// Resolving the job failed; the lease will expire and the job comes back
    Failed(String),
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub batches: u64,
    pub jobs_claimed: u64,
    pub completed: u64,
    pub retried: u64,
    pub dead: u64,
    pub abandoned: u64,
    pub resolution_errors: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn record(&mut self, resolutions: &[Resolution]) {
        if resolutions.is_empty() {
            return;
        }
        self.batches += 1;
        self.jobs_claimed += resolutions.len() as u64;
        for resolution in resolutions {
            match resolution {
                Resolution::Completed => self.completed += 1,
                Resolution::Retried(_) => self.retried += 1,
                Resolution::Dead => self.dead += 1,
                Resolution::Abandoned => self.abandoned += 1,
                Resolution::Failed(_) => self.resolution_errors += 1,
            }
        }
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the in-flight batch to resolve.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Background job worker.
///
/// Claims batches through a `SchedulerService`, runs each job on its own
/// thread while a companion thread keeps the lease alive, then resolves the
/// job from the handler's `JobOutcome`:
///
/// - `Success` → `save(Completed)`
/// - anything else → `delay_retry` while the retry budget lasts, otherwise
///   `save(Dead)`
///
/// A handler panic counts as a `Failure`. If the lease is lost mid-run the
/// result is discarded; the job is already visible to other workers.
pub struct JobWorker<Q, S> {
    scheduler: Arc<SchedulerService<Q, S>>,
    handlers: HashMap<String, JobHandler>,
    config: WorkerConfig,
}

impl<Q, S> JobWorker<Q, S>
where
    Q: JobQueue + 'static,
    S: JobStore + 'static,
{
    pub fn new(scheduler: Arc<SchedulerService<Q, S>>, config: WorkerConfig) -> Self {
        Self {
            scheduler,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register logic for a job name. `"*"` catches names with no handler.
    pub fn register_handler<F>(&mut self, job_name: impl Into<String>, handler: F)
    where
        F: Fn(&mut JobContext) -> JobOutcome + Send + Sync + 'static,
    {
        self.handlers.insert(job_name.into(), Box::new(handler));
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn handler_for(&self, job_name: &str) -> Option<&JobHandler> {
        self.handlers
            .get(job_name)
            .or_else(|| self.handlers.get("*"))
    }

    /// Spawn the claim loop in a background thread.
    pub fn spawn(self) -> Result<WorkerHandle, WorkerError> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || worker_loop(self, shutdown_rx, stats_clone))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    /// Claim one batch and run it to completion.
    ///
    /// Jobs in the batch run concurrently. Returns one resolution per claimed
    /// job; an empty vec means nothing was due.
    pub fn run_batch(&self) -> Result<Vec<Resolution>, WorkerError> {
        let handles = self.scheduler.get_jobs(self.config.batch_size)?;
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let resolutions = thread::scope(|scope| {
            let running: Vec<_> = handles
                .into_iter()
                .map(|handle| scope.spawn(move || self.run_job(handle)))
                .collect();

            running
                .into_iter()
                .map(|j| {
                    j.join()
                        .unwrap_or_else(|_| Resolution::Failed("job thread panicked".to_string()))
                })
                .collect()
        });

        Ok(resolutions)
    }

    fn run_job(&self, handle: JobHandle) -> Resolution {
        let job_id = handle.job_id();
        let mut ctx = JobContext::from_handle(&handle);
        let interval = self
            .config
            .heartbeat_interval_for(self.scheduler.config().lease_timeout);

        let shared = Mutex::new(handle);
        let lost = AtomicBool::new(false);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let outcome = thread::scope(|scope| {
            let (shared, lost) = (&shared, &lost);
            scope.spawn(move || self.heartbeat_loop(shared, lost, stop_rx, interval));

            let outcome = self.invoke(&mut ctx);
            drop(stop_tx);
            outcome
        });

        let mut handle = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        if lost.load(Ordering::SeqCst) {
            warn!(
                worker = %self.config.name,
                job_id = %job_id,
                ?outcome,
                "lease lost while running; discarding result"
            );
            return Resolution::Abandoned;
        }

        handle.payload_mut().data = ctx.data;
        self.resolve(&mut handle, outcome)
    }

    fn invoke(&self, ctx: &mut JobContext) -> JobOutcome {
        let Some(handler) = self.handler_for(&ctx.job_name) else {
            warn!(worker = %self.config.name, job_name = %ctx.job_name, "no handler for job");
            return JobOutcome::Failure(format!("no handler for job: {}", ctx.job_name));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(worker = %self.config.name, job_id = %ctx.job_id, "job handler panicked");
                JobOutcome::Failure("job handler panicked".to_string())
            }
        }
    }

    fn heartbeat_loop(
        &self,
        shared: &Mutex<JobHandle>,
        lost: &AtomicBool,
        stop: mpsc::Receiver<()>,
        interval: Duration,
    ) {
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }

            let mut handle = shared.lock().unwrap_or_else(PoisonError::into_inner);
            match self.scheduler.heartbeat(&mut handle) {
                Ok(lease_id) => {
                    debug!(job_id = %handle.job_id(), %lease_id, "lease renewed");
                }
                Err(SchedulerError::LeaseNotFound { job_id, lease_id }) => {
                    warn!(worker = %self.config.name, %job_id, %lease_id, "lease lost");
                    lost.store(true, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    // Try again next tick; the lease may still outlive the outage.
                    warn!(worker = %self.config.name, job_id = %handle.job_id(), error = %e, "heartbeat failed");
                }
            }
        }
    }

    fn resolve(&self, handle: &mut JobHandle, outcome: JobOutcome) -> Resolution {
        let (error, requested_delay) = match outcome {
            JobOutcome::Success => {
                let result = self
                    .scheduler
                    .save(handle, JobStatus::Completed)
                    .map(|()| Resolution::Completed);
                return self.finish(handle, result);
            }
            JobOutcome::Failure(e) => (e, None),
            JobOutcome::RetryNow => ("retry requested".to_string(), Some(Duration::ZERO)),
            JobOutcome::RetryAfter(d) => ("retry after delay".to_string(), Some(d)),
        };
        handle.payload_mut().record_error(error);

        let policy = &self.config.retry_policy;
        let result = if policy.allows_retry(handle.payload()) {
            let delay = requested_delay.unwrap_or_else(|| policy.delay_for(handle.payload()));
            self.scheduler
                .delay_retry(handle, delay)
                .map(|()| Resolution::Retried(delay))
        } else {
            handle.set_status(JobStatus::Dead);
            self.scheduler
                .save(handle, JobStatus::Dead)
                .map(|()| Resolution::Dead)
        };
        self.finish(handle, result)
    }

    fn finish(&self, handle: &JobHandle, result: Result<Resolution, SchedulerError>) -> Resolution {
        match result {
            Ok(resolution) => {
                debug!(
                    worker = %self.config.name,
                    job_id = %handle.job_id(),
                    ?resolution,
                    "job resolved"
                );
                resolution
            }
            Err(SchedulerError::LeaseNotFound { job_id, lease_id }) => {
                warn!(worker = %self.config.name, %job_id, %lease_id, "lease lost before resolution; discarding result");
                Resolution::Abandoned
            }
            Err(SchedulerError::StaleJob(job_id)) => {
                info!(worker = %self.config.name, %job_id, "job deleted while running");
                Resolution::Abandoned
            }
            Err(e) => {
                error!(
                    worker = %self.config.name,
                    job_id = %handle.job_id(),
                    error = %e,
                    "failed to resolve job"
                );
                Resolution::Failed(e.to_string())
            }
        }
    }
}

fn worker_loop<Q, S>(
    worker: JobWorker<Q, S>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    Q: JobQueue + 'static,
    S: JobStore + 'static,
{
    let name = worker.config.name.clone();
    info!(worker = %name, batch_size = worker.config.batch_size, "job worker started");
    let start_time = Instant::now();

    loop {
        let idle = match worker.run_batch() {
            Ok(resolutions) => {
                let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
                s.record(&resolutions);
                s.uptime_secs = start_time.elapsed().as_secs();
                resolutions.is_empty()
            }
            Err(e) => {
                error!(worker = %name, error = %e, "failed to claim jobs");
                true
            }
        };

        let wait = if idle {
            worker.config.poll_interval
        } else {
            Duration::ZERO
        };
        match shutdown_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = %name, "job worker stopped");
}
