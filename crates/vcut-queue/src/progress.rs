//! Outbound progress and failure messages via Redis Streams.

use serde::Serialize;
use tracing::debug;

use vcut_models::{FailureMessage, JobId, ProgressMessage};

use crate::error::QueueResult;
use crate::queue::{QueueConfig, PAYLOAD_FIELD};

/// Appends JSON messages to one capped stream.
#[derive(Clone)]
struct StreamPublisher {
    client: redis::Client,
    stream: String,
    max_len: usize,
}

impl StreamPublisher {
    fn new(redis_url: &str, stream: &str, max_len: usize) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            stream: stream.to_string(),
            max_len,
        })
    }

    async fn publish<T: Serialize>(&self, message: &T) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(message)?;

        let id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!("Published {} to {} as {}", payload, self.stream, id);
        Ok(id)
    }
}

/// Channel for `{videoId, stage}` progress messages.
#[derive(Clone)]
pub struct ProgressChannel {
    publisher: StreamPublisher,
}

impl ProgressChannel {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        Ok(Self {
            publisher: StreamPublisher::new(
                &config.redis_url,
                &config.progress_stream,
                config.outbound_max_len,
            )?,
        })
    }

    /// Publish a stage label for a job.
    pub async fn stage(&self, job_id: &JobId, stage: &str) -> QueueResult<()> {
        self.publisher
            .publish(&ProgressMessage::new(job_id, stage))
            .await
            .map(|_| ())
    }
}

/// Channel for `{success: false, videoId}` failure messages.
#[derive(Clone)]
pub struct FinishChannel {
    publisher: StreamPublisher,
}

impl FinishChannel {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        Ok(Self {
            publisher: StreamPublisher::new(
                &config.redis_url,
                &config.finish_stream,
                config.outbound_max_len,
            )?,
        })
    }

    /// Publish a job failure.
    pub async fn failed(&self, job_id: &JobId) -> QueueResult<()> {
        self.publisher
            .publish(&FailureMessage::new(job_id))
            .await
            .map(|_| ())
    }
}
