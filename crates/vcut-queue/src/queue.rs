//! Job queue using Redis Streams.

use std::time::Duration;

use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{QueueError, QueueResult};

/// Stream entry field holding the JSON payload, on every stream.
pub const PAYLOAD_FIELD: &str = "job";

/// Build a Redis URL from discrete connection values.
pub fn redis_url(host: &str, port: u16, password: &str) -> QueueResult<String> {
    let mut url = Url::parse(&format!("redis://{host}:{port}/"))
        .map_err(|e| QueueError::connection_failed(format!("invalid redis host {host}: {e}")))?;
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| QueueError::connection_failed("cannot set redis password"))?;
    }
    Ok(url.to_string())
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Stream receiving `{videoId, stage}` progress messages
    pub progress_stream: String,
    /// Stream receiving `{success: false, videoId}` failure messages
    pub finish_stream: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// How long one XREADGROUP call blocks
    pub block: Duration,
    /// Deliveries after which a pending job is dead-lettered instead of reclaimed
    pub max_deliveries: u64,
    /// Approximate length cap of the progress and finish streams
    pub outbound_max_len: usize,
}

impl QueueConfig {
    /// Config with default stream names for the given connection.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            stream_name: "PROCESS_VIDEO_QUEUE".to_string(),
            progress_stream: "PROCESS_VIDEO_PROGRESS_QUEUE".to_string(),
            finish_stream: "PROCESS_VIDEO_FINISH_QUEUE".to_string(),
            consumer_group: "vcut:workers".to_string(),
            dlq_stream_name: "PROCESS_VIDEO_DLQ".to_string(),
            block: Duration::from_secs(5),
            max_deliveries: 3,
            outbound_max_len: 10_000,
        }
    }

    /// Create config for the given connection, applying `QUEUE_*` overrides.
    pub fn from_env(redis_url: impl Into<String>) -> Self {
        let defaults = Self::new(redis_url);
        Self {
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            progress_stream: std::env::var("QUEUE_PROGRESS_STREAM")
                .unwrap_or(defaults.progress_stream),
            finish_stream: std::env::var("QUEUE_FINISH_STREAM").unwrap_or(defaults.finish_stream),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            block: std::env::var("QUEUE_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.block),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_deliveries),
            outbound_max_len: std::env::var("QUEUE_OUTBOUND_MAX_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.outbound_max_len),
            redis_url: defaults.redis_url,
        }
    }
}

/// A raw message read from the job stream.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: String,
    pub payload: String,
}

/// A pending entry that exhausted its deliveries and was moved to the DLQ.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub message_id: String,
    /// Payload at the time of dead-lettering, empty if it was unreadable
    pub payload: String,
    pub reason: String,
}

/// Result of one crash-recovery scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimedJobs {
    pub claimed: Vec<QueueMessage>,
    pub dead_lettered: Vec<DeadLetter>,
}

/// Split pending `(id, times_delivered)` entries into ids to reclaim and
/// entries past `max_deliveries`.
fn partition_pending(
    entries: impl IntoIterator<Item = (String, usize)>,
    max_deliveries: u64,
) -> (Vec<String>, Vec<(String, usize)>) {
    let mut claimable = Vec::new();
    let mut exhausted = Vec::new();
    for (id, times_delivered) in entries {
        if times_delivered as u64 > max_deliveries {
            exhausted.push((id, times_delivered));
        } else {
            claimable.push(id);
        }
    }
    (claimable, exhausted)
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Start at 0 so jobs enqueued while no worker was running are picked up
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Acknowledge a job and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue and acknowledge it.
    pub async fn dlq(&self, message_id: &str, payload: &str, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Moved message {} to DLQ: {}", message_id, error);
        Ok(())
    }

    /// Read up to `count` new messages for this consumer.
    pub async fn consume(&self, consumer_name: &str, count: usize) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(self.config.block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = result.keys.into_iter().flat_map(|key| key.ids).collect();
        self.into_messages(entries).await
    }

    /// Claim pending jobs that have been idle for too long.
    ///
    /// This handles jobs from crashed workers. Entries delivered more than
    /// `max_deliveries` times are dead-lettered instead and returned
    /// separately so the caller can report them.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<ClaimedJobs> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let (claimable, exhausted) = partition_pending(
            pending.ids.into_iter().map(|entry| (entry.id, entry.times_delivered)),
            self.config.max_deliveries,
        );

        let mut dead_lettered = Vec::with_capacity(exhausted.len());
        for (message_id, deliveries) in exhausted {
            let payload = self.read_payload(&message_id).await?.unwrap_or_default();
            let reason = format!("abandoned after {deliveries} deliveries");
            self.dlq(&message_id, &payload, &reason).await?;
            dead_lettered.push(DeadLetter {
                message_id,
                payload,
                reason,
            });
        }

        if claimable.is_empty() {
            return Ok(ClaimedJobs {
                claimed: Vec::new(),
                dead_lettered,
            });
        }

        let result: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg(&claimable)
            .query_async(&mut conn)
            .await?;

        info!("Claimed {} pending job(s) from stream", result.ids.len());
        let claimed = self.into_messages(result.ids).await?;
        Ok(ClaimedJobs {
            claimed,
            dead_lettered,
        })
    }

    /// Reset the idle time of a job this consumer is still working on, so
    /// other workers do not reclaim it.
    pub async fn heartbeat(&self, consumer_name: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let owned: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        if owned.is_empty() {
            warn!("Job {} is no longer pending, heartbeat had no effect", message_id);
        }
        Ok(())
    }

    async fn read_payload(&self, message_id: &str) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let reply: redis::streams::StreamRangeReply =
            conn.xrange(&self.config.stream_name, message_id, message_id).await?;
        Ok(reply.ids.first().and_then(|entry| entry.get(PAYLOAD_FIELD)))
    }

    /// Keep entries with a payload; ack the rest.
    async fn into_messages(&self, entries: Vec<StreamId>) -> QueueResult<Vec<QueueMessage>> {
        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.get::<String>(PAYLOAD_FIELD) {
                Some(payload) => messages.push(QueueMessage {
                    message_id: entry.id,
                    payload,
                }),
                None => {
                    warn!("Stream entry {} has no {} field, dropping it", entry.id, PAYLOAD_FIELD);
                    self.ack(&entry.id).await?;
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_without_password() {
        assert_eq!(redis_url("127.0.0.1", 6379, "").unwrap(), "redis://127.0.0.1:6379/");
    }

    #[test]
    fn test_redis_url_encodes_password() {
        let url = redis_url("video-cut-tool", 6380, "p@ss word").unwrap();
        assert_eq!(url, "redis://:p%40ss%20word@video-cut-tool:6380/");
    }

    #[test]
    fn test_default_stream_names() {
        let config = QueueConfig::new("redis://localhost:6379/");
        assert_eq!(config.stream_name, "PROCESS_VIDEO_QUEUE");
        assert_eq!(config.progress_stream, "PROCESS_VIDEO_PROGRESS_QUEUE");
        assert_eq!(config.finish_stream, "PROCESS_VIDEO_FINISH_QUEUE");
    }

    #[test]
    fn test_partition_pending_by_delivery_count() {
        let entries = vec![
            ("1-0".to_string(), 1),
            ("2-0".to_string(), 3),
            ("3-0".to_string(), 4),
        ];
        let (claimable, exhausted) = partition_pending(entries, 3);
        assert_eq!(claimable, vec!["1-0", "2-0"]);
        assert_eq!(exhausted, vec![("3-0".to_string(), 4)]);
    }

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(JobQueue::new(QueueConfig::new("not-a-redis-url")).is_err());
    }
}
