//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "vcut_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vcut_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vcut_jobs_failed_total";
    pub const PAYLOADS_REJECTED_TOTAL: &str = "vcut_payloads_rejected_total";

    pub const STAGE_DURATION_SECONDS: &str = "vcut_stage_duration_seconds";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "vcut_download_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "vcut_upload_duration_seconds";
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record job started.
pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

/// Record job delivered to the backend.
pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

/// Record job failed, by failure kind (stage kind, download, upload, ...).
pub fn record_job_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record a payload that never became a job.
pub fn record_payload_rejected() {
    counter!(names::PAYLOADS_REJECTED_TOTAL).increment(1);
}

/// Record one stage's duration.
pub fn record_stage_duration(stage: &str, success: bool, duration_secs: f64) {
    let labels = [
        ("stage", stage.to_string()),
        ("status", if success { "ok" } else { "error" }.to_string()),
    ];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record download duration.
pub fn record_download_duration(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

/// Record upload duration.
pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}
