//! Scheduling metrics.

use std::time::Duration;
use tracing::debug;

/// Receives scheduling timings. Never affects scheduling behavior.
pub trait Metrics: Send + Sync {
    /// A whole pipeline tick.
    fn full_scheduling_duration(&self, pipeline: &str, duration: Duration);

    /// Loading the versions snapshot a job is scheduled against. Jobs of one
    /// tick share a snapshot, so they report the same load.
    fn load_versions_duration(&self, pipeline: &str, job: &str, duration: Duration);

    /// Scheduling one job.
    fn job_scheduling_duration(&self, pipeline: &str, job: &str, duration: Duration);
}

/// Emits metrics as `tracing` events on the `tempo::metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn full_scheduling_duration(&self, pipeline: &str, duration: Duration) {
        debug!(
            target: "tempo::metrics",
            pipeline,
            duration_ms = duration.as_millis() as u64,
            "full scheduling duration"
        );
    }

    fn load_versions_duration(&self, pipeline: &str, job: &str, duration: Duration) {
        debug!(
            target: "tempo::metrics",
            pipeline,
            job,
            duration_ms = duration.as_millis() as u64,
            "load versions duration"
        );
    }

    fn job_scheduling_duration(&self, pipeline: &str, job: &str, duration: Duration) {
        debug!(
            target: "tempo::metrics",
            pipeline,
            job,
            duration_ms = duration.as_millis() as u64,
            "job scheduling duration"
        );
    }
}
