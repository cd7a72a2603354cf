use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tracing::info;

use jobkeeper_core::{Clock, SchedulerConfig, SystemClock};
use jobkeeper_queue::{InMemoryJobQueue, JobQueue};
use jobkeeper_runtime::{JobContext, JobOutcome, JobWorker, WorkerConfig};
use jobkeeper_scheduler::SchedulerService;
use jobkeeper_store::{InMemoryJobStore, JobStore};

const ENV_REDIS_URL: &str = "JOBKEEPER_REDIS_URL";

fn main() -> anyhow::Result<()> {
    jobkeeper_observability::init();

    let scheduler_config = SchedulerConfig::from_env().context("invalid scheduler config")?;
    let worker_config = WorkerConfig::from_env().context("invalid worker config")?;
    let clock = SystemClock::arc();

    if let Ok(url) = std::env::var(ENV_REDIS_URL) {
        return run_redis(&url, clock, scheduler_config, worker_config);
    }

    info!("using in-memory backend");
    let queue = InMemoryJobQueue::arc(clock.clone());
    let store = InMemoryJobStore::arc(clock.clone());
    run(queue, store, clock, scheduler_config, worker_config, true)
}

#[cfg(feature = "redis")]
fn run_redis(
    url: &str,
    clock: Arc<dyn Clock>,
    scheduler_config: SchedulerConfig,
    worker_config: WorkerConfig,
) -> anyhow::Result<()> {
    use jobkeeper_infra::{RedisJobQueue, RedisJobStore};

    info!("using redis backend");
    let queue = RedisJobQueue::new(url, None)
        .context("failed to open redis queue")?
        .with_clock(clock.clone());
    let store = RedisJobStore::new(url, None)
        .context("failed to open redis store")?
        .with_clock(clock.clone());
    run(queue, store, clock, scheduler_config, worker_config, false)
}

#[cfg(not(feature = "redis"))]
fn run_redis(
    _url: &str,
    _clock: Arc<dyn Clock>,
    _scheduler_config: SchedulerConfig,
    _worker_config: WorkerConfig,
) -> anyhow::Result<()> {
    anyhow::bail!("{ENV_REDIS_URL} is set but this build has no redis support (enable the `redis` feature)")
}

fn run<Q, S>(
    queue: Q,
    store: S,
    clock: Arc<dyn Clock>,
    scheduler_config: SchedulerConfig,
    worker_config: WorkerConfig,
    seed_demo_job: bool,
) -> anyhow::Result<()>
where
    Q: JobQueue + 'static,
    S: JobStore + 'static,
{
    let scheduler = Arc::new(
        SchedulerService::new(queue, store, clock.clone(), scheduler_config)
            .context("failed to build scheduler")?,
    );

    info!(
        instance_id = %scheduler.instance_id(),
        queue_name = %scheduler.config().queue_name,
        lease_timeout_ms = scheduler.config().lease_timeout.as_millis() as u64,
        worker = %worker_config.name,
        "scheduler ready"
    );

    if seed_demo_job {
        let payload = scheduler
            .create_job("demo", clock.now_ms(), json!({"hello": "world"}))
            .context("failed to seed demo job")?;
        info!(job_id = %payload.id, "seeded demo job");
    }

    let mut worker = JobWorker::new(scheduler, worker_config);
    worker.register_handler("*", log_job);

    let handle = worker.spawn().context("failed to start worker")?;
    info!("worker running; send SIGINT or SIGTERM to stop");

    let signal = wait_for_shutdown_signal().context("failed to wait for shutdown signal")?;
    info!(signal, "received shutdown signal, draining worker");

    let stats = handle.stats();
    handle.shutdown();
    info!(
        completed = stats.completed,
        retried = stats.retried,
        dead = stats.dead,
        abandoned = stats.abandoned,
        "worker stopped"
    );
    Ok(())
}

/// Blocks the calling thread until SIGINT (or SIGTERM on unix) arrives.
fn wait_for_shutdown_signal() -> anyhow::Result<&'static str> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to build signal runtime")?;

    runtime.block_on(async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm =
                signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    res.context("failed to install SIGINT handler")?;
                    Ok("SIGINT")
                }
                _ = sigterm.recv() => Ok("SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .context("failed to install Ctrl+C handler")?;
            Ok("ctrl-c")
        }
    })
}

fn log_job(ctx: &mut JobContext) -> JobOutcome {
    info!(
        job_name = %ctx.job_name,
        job_id = %ctx.job_id,
        attempts = ctx.attempts,
        data = %ctx.data,
        "running job"
    );
    JobOutcome::Success
}
