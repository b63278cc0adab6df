//! Progress reporting.
//!
//! Reports are fire-and-forget: the pipeline hands a label over and moves on.
//! A single background task publishes them in submission order, so labels of
//! one job reach the channel in the order they were reported.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vcut_models::{JobId, ProgressMessage};
use vcut_queue::{ProgressChannel, QueueResult};

/// Receives stage-name progress events.
pub trait ProgressReporter: Send + Sync {
    /// Report that `job_id` entered `stage`. Never blocks.
    fn report(&self, job_id: &JobId, stage: &str);
}

/// Destination of queued progress messages.
#[async_trait]
pub trait ProgressPublisher: Send + Sync + 'static {
    async fn publish(&self, message: &ProgressMessage) -> QueueResult<()>;
}

#[async_trait]
impl ProgressPublisher for ProgressChannel {
    async fn publish(&self, message: &ProgressMessage) -> QueueResult<()> {
        self.stage(&message.video_id, &message.stage).await
    }
}

/// Reporter backed by an unbounded queue drained by one publishing task.
#[derive(Clone)]
pub struct QueuedProgressReporter {
    tx: mpsc::UnboundedSender<ProgressMessage>,
}

impl QueuedProgressReporter {
    /// Spawn the publishing task. It ends once every reporter clone is dropped
    /// and the queue is drained.
    pub fn spawn<P: ProgressPublisher>(publisher: P) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressMessage>();

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match publisher.publish(&message).await {
                    Ok(()) => debug!(
                        job_id = %message.video_id,
                        stage = %message.stage,
                        "Published progress"
                    ),
                    Err(e) => warn!(
                        job_id = %message.video_id,
                        stage = %message.stage,
                        "Failed to publish progress: {}", e
                    ),
                }
            }
        });

        (Self { tx }, handle)
    }
}

impl ProgressReporter for QueuedProgressReporter {
    fn report(&self, job_id: &JobId, stage: &str) {
        if self.tx.send(ProgressMessage::new(job_id, stage)).is_err() {
            warn!(job_id = %job_id, stage, "Progress publisher stopped, dropping report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingPublisher {
        published: Arc<Mutex<Vec<ProgressMessage>>>,
        delay: Duration,
    }

    #[async_trait]
    impl ProgressPublisher for RecordingPublisher {
        async fn publish(&self, message: &ProgressMessage) -> QueueResult<()> {
            tokio::time::sleep(self.delay).await;
            self.published.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reports_are_published_in_order() {
        let publisher = RecordingPublisher {
            delay: Duration::from_millis(5),
            ..Default::default()
        };
        let published = Arc::clone(&publisher.published);
        let (reporter, handle) = QueuedProgressReporter::spawn(publisher);

        let job = JobId::from("v1");
        for stage in ["downloading", "trimming", "concating"] {
            reporter.report(&job, stage);
        }
        drop(reporter);
        handle.await.unwrap();

        let stages: Vec<_> = published.lock().unwrap().iter().map(|m| m.stage.clone()).collect();
        assert_eq!(stages, vec!["downloading", "trimming", "concating"]);
    }

    #[tokio::test]
    async fn test_report_does_not_wait_for_delivery() {
        let publisher = RecordingPublisher {
            delay: Duration::from_secs(3600),
            ..Default::default()
        };
        let (reporter, handle) = QueuedProgressReporter::spawn(publisher);

        let started = std::time::Instant::now();
        reporter.report(&JobId::from("v1"), "downloading");
        assert!(started.elapsed() < Duration::from_secs(1));

        handle.abort();
    }
}
