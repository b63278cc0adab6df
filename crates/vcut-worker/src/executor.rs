//! Job intake: drain the job stream into a bounded pool of job tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vcut_queue::{parse_payload, payload_job_id, ClaimedJobs, JobQueue, QueueMessage, QueueResult};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::processor::JobProcessor;

/// The job stream as seen by the executor.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn init(&self) -> QueueResult<()>;

    async fn consume(&self, consumer_name: &str, count: usize) -> QueueResult<Vec<QueueMessage>>;

    async fn claim_pending(&self, consumer_name: &str, min_idle: Duration, count: usize)
        -> QueueResult<ClaimedJobs>;

    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Keep a job owned by `consumer_name` from looking idle.
    async fn heartbeat(&self, consumer_name: &str, message_id: &str) -> QueueResult<()>;
}

#[async_trait]
impl JobSource for JobQueue {
    async fn init(&self) -> QueueResult<()> {
        JobQueue::init(self).await
    }

    async fn consume(&self, consumer_name: &str, count: usize) -> QueueResult<Vec<QueueMessage>> {
        JobQueue::consume(self, consumer_name, count).await
    }

    async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<ClaimedJobs> {
        JobQueue::claim_pending(self, consumer_name, min_idle, count).await
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        JobQueue::ack(self, message_id).await
    }

    async fn heartbeat(&self, consumer_name: &str, message_id: &str) -> QueueResult<()> {
        JobQueue::heartbeat(self, consumer_name, message_id).await
    }
}

/// Everything a spawned job task needs.
#[derive(Clone)]
struct JobRunner {
    source: Arc<dyn JobSource>,
    processor: Arc<JobProcessor>,
    consumer_name: Arc<str>,
    heartbeat_interval: Duration,
}

impl JobRunner {
    /// Run one message to its terminal state and acknowledge it exactly once.
    async fn execute(self, message: QueueMessage) {
        let job = async {
            match parse_payload(&message.payload) {
                Ok(settings) => {
                    info!(job_id = %settings.id, message_id = %message.message_id, "Executing job");
                    self.processor.process(&settings).await;
                }
                Err(e) => {
                    self.processor.reject(e.payload_job_id(), &e.to_string()).await;
                }
            }
        };

        with_heartbeat(
            self.source.as_ref(),
            &self.consumer_name,
            &message.message_id,
            self.heartbeat_interval,
            job,
        )
        .await;

        if let Err(e) = self.source.ack(&message.message_id).await {
            error!("Failed to ack message {}: {}", message.message_id, e);
        }
    }
}

/// Drive `job` to completion, refreshing the claim on `message_id` every
/// `every` while it runs.
async fn with_heartbeat<F: Future>(
    source: &dyn JobSource,
    consumer_name: &str,
    message_id: &str,
    every: Duration,
    job: F,
) -> F::Output {
    tokio::pin!(job);
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            output = &mut job => return output,
            _ = ticker.tick() => {
                match source.heartbeat(consumer_name, message_id).await {
                    Ok(()) => debug!("Refreshed claim on {}", message_id),
                    Err(e) => warn!("Heartbeat for {} failed: {}", message_id, e),
                }
            }
        }
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    runner: JobRunner,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, source: Arc<dyn JobSource>, processor: JobProcessor) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let runner = JobRunner {
            source,
            processor: Arc::new(processor),
            consumer_name: Arc::from(format!("worker-{}", Uuid::new_v4())),
            heartbeat_interval: config.job_heartbeat_interval,
        };

        Self {
            config,
            runner,
            job_semaphore,
            shutdown,
        }
    }

    /// Start the executor. Returns after shutdown once in-flight jobs have
    /// finished or the shutdown timeout expired.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.runner.consumer_name, self.config.max_concurrent_jobs
        );
        if !self.config.heartbeat_outpaces_reclaim() {
            warn!(
                "Job heartbeat {:?} is not shorter than claim idle time {:?}, long jobs may run twice",
                self.config.job_heartbeat_interval, self.config.claim_min_idle
            );
        }

        self.runner.source.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout of {:?} expired with jobs still running",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically reclaim jobs left pending by crashed workers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let runner = self.runner.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = self.config.claim_min_idle;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = Self::recover_pending(&runner, &semaphore, claim_min_idle).await {
                            warn!("Failed to claim pending jobs: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// One crash-recovery scan: report dead-lettered jobs as failed and run
    /// the reclaimed ones.
    async fn recover_pending(runner: &JobRunner, semaphore: &Arc<Semaphore>, min_idle: Duration) -> QueueResult<()> {
        let available = semaphore.available_permits();
        if available == 0 {
            return Ok(());
        }

        let ClaimedJobs { claimed, dead_lettered } = runner
            .source
            .claim_pending(&runner.consumer_name, min_idle, available)
            .await?;

        for dead in dead_lettered {
            warn!(message_id = %dead.message_id, "Job dead-lettered: {}", dead.reason);
            runner
                .processor
                .abandon(payload_job_id(&dead.payload).as_ref(), &dead.reason)
                .await;
        }

        if !claimed.is_empty() {
            info!("Claimed {} pending jobs", claimed.len());
        }
        for message in claimed {
            let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
                return Ok(());
            };
            let runner = runner.clone();
            tokio::spawn(async move {
                let _permit = permit;
                runner.execute(message).await;
            });
        }
        Ok(())
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let messages = self
            .runner
            .source
            .consume(&self.runner.consumer_name, available)
            .await?;
        if messages.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", messages.len());

        for message in messages {
            let permit = match Arc::clone(&self.job_semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("Job semaphore closed, leaving {} pending", message.message_id);
                    continue;
                }
            };
            let runner = self.runner.clone();

            tokio::spawn(async move {
                let _permit = permit;
                runner.execute(message).await;
            });
        }

        Ok(())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn consumer_name(&self) -> &str {
        &self.runner.consumer_name
    }
}
