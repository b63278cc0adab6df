//! Video edit worker.
//!
//! This crate provides:
//! - Planning of edit requests into ordered stages
//! - Pipeline execution with progress reporting
//! - Result delivery to the backend and failure reporting
//! - Job intake from the queue with graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod notifier;
pub mod pipeline;
pub mod planner;
pub mod processor;
pub mod reporter;

pub use config::{RuntimeEnvironment, ServiceConfig, WorkerConfig};
pub use error::{NotificationError, PipelineError, WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobSource};
pub use logging::JobLogger;
pub use notifier::{BackendClient, FailureReporter, JobOutcome, ResultNotifier, ResultUploader};
pub use pipeline::{JobWorkspace, PipelineExecutor, PipelineOutput, PipelineState};
pub use planner::{plan, MergePolicy};
pub use processor::JobProcessor;
pub use reporter::{ProgressPublisher, ProgressReporter, QueuedProgressReporter};
