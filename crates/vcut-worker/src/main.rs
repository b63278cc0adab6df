//! Video edit worker binary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcut_media::{EngineConfig, FfmpegEngine};
use vcut_queue::{redis_url, FinishChannel, JobQueue, ProgressChannel, QueueConfig};
use vcut_worker::metrics::init_metrics;
use vcut_worker::{
    BackendClient, JobExecutor, JobProcessor, PipelineExecutor, QueuedProgressReporter, ResultNotifier,
    ServiceConfig, WorkerConfig, WorkerError, WorkerResult,
};

const REPORTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting vcut-worker");

    if let Err(e) = run().await {
        error!("Worker error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vcut=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> WorkerResult<()> {
    let service = ServiceConfig::from_env();
    let config = WorkerConfig::from_env();
    info!("Service config: {:?}", service);
    info!("Worker config: {:?}", config);

    let url = redis_url(&service.redis_host, service.redis_port, &service.redis_password)?;
    let queue_config = QueueConfig::from_env(url);

    if let Some(addr) = config.metrics_addr {
        match init_metrics(addr) {
            Ok(()) => info!("Metrics exporter listening on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| WorkerError::config_error(format!("HTTP client: {e}")))?;
    let engine = FfmpegEngine::new(EngineConfig::default(), http);
    engine.validate()?;

    tokio::fs::create_dir_all(&config.work_dir).await?;

    let progress = ProgressChannel::new(&queue_config)?;
    let finish = FinishChannel::new(&queue_config)?;
    let (reporter, reporter_task) = QueuedProgressReporter::spawn(progress);

    let backend = BackendClient::new(&service.api_root, config.upload_timeout)
        .map_err(|e| WorkerError::config_error(format!("backend client: {e}")))?;
    info!(endpoint = backend.endpoint(), "Delivering results to backend");

    let pipeline = PipelineExecutor::new(Arc::new(engine), Arc::new(reporter), config.work_dir.clone());
    let notifier = ResultNotifier::new(Arc::new(backend), Arc::new(finish));
    let processor = JobProcessor::new(pipeline, notifier, config.merge_policy);

    let queue = JobQueue::new(queue_config)?;
    let executor = Arc::new(JobExecutor::new(config, Arc::new(queue), processor));

    // Setup signal handler
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    let result = executor.run().await;

    // The publishing task exits once every reporter handle is dropped.
    drop(executor);
    match tokio::time::timeout(REPORTER_DRAIN_TIMEOUT, reporter_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Progress reporter task ended abnormally: {}", e),
        Err(_) => warn!("Progress reporter still draining after {:?}", REPORTER_DRAIN_TIMEOUT),
    }

    result
}
