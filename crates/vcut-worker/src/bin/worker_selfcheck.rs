//! Startup probe: work directory, media tools and Redis reachability.

use std::path::Path;

use vcut_queue::redis_url;
use vcut_worker::{ServiceConfig, WorkerConfig, WorkerError, WorkerResult};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = run().await {
        eprintln!("worker-selfcheck: {}", e);
        std::process::exit(1);
    }
    println!("worker-selfcheck: ok");
}

async fn run() -> WorkerResult<()> {
    let service = ServiceConfig::from_env();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={} environment={}",
        config.work_dir.display(),
        service.environment.as_str()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_media_tools()?;
    ensure_redis(&service).await?;
    Ok(())
}

async fn ensure_workdir(path: &Path) -> WorkerResult<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = tempfile::NamedTempFile::new_in(path)?;
    drop(probe);
    Ok(())
}

fn ensure_media_tools() -> WorkerResult<()> {
    let ffmpeg = vcut_media::check_ffmpeg()?;
    let ffprobe = vcut_media::check_ffprobe()?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    Ok(())
}

async fn ensure_redis(service: &ServiceConfig) -> WorkerResult<()> {
    let url = redis_url(&service.redis_host, service.redis_port, &service.redis_password)?;
    let client = redis::Client::open(url)
        .map_err(|e| WorkerError::config_error(format!("redis url: {e}")))?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| WorkerError::config_error(format!("redis unreachable at {}:{}: {e}", service.redis_host, service.redis_port)))?;
    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| WorkerError::config_error(format!("redis ping failed: {e}")))?;
    println!("worker-selfcheck: redis {}", pong);
    Ok(())
}
