//! Redis Streams transport for the video edit worker.
//!
//! This crate provides:
//! - Job consumption via a consumer group, with crash recovery and DLQ
//! - Progress and failure messages published to their own streams
//! - Parsing of raw job payloads into validated settings

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{extract_job_id, parse_payload, payload_job_id, ProcessVideoPayload};
pub use progress::{FinishChannel, ProgressChannel};
pub use queue::{redis_url, ClaimedJobs, DeadLetter, JobQueue, QueueConfig, QueueMessage};
