//! Scheduler error types.
//!
//! Each variant names the operation that failed; the underlying storage or
//! collaborator error is kept as the source.

use tempo_config::ConfigError;
use tempo_core::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("pipeline removed: {0}")]
    PipelineRemoved(String),

    #[error("interval must be greater than zero")]
    InvalidInterval,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("scheduling panicked: {0}")]
    Panicked(String),

    #[error("job guard closed")]
    GuardClosed,

    #[error("reload pipeline: {0}")]
    ReloadPipeline(#[source] Error),

    #[error("check paused: {0}")]
    CheckPaused(#[source] Error),

    #[error("load versions db: {0}")]
    LoadVersionsDb(#[source] Error),

    #[error("load jobs: {0}")]
    LoadJobs(#[source] Error),

    #[error("reload job: {0}")]
    ReloadJob(#[source] Error),

    #[error("load resources: {0}")]
    LoadResources(#[source] Error),

    #[error("load resource types: {0}")]
    LoadResourceTypes(#[source] Error),

    #[error("save next input mapping: {0}")]
    SaveNextInputMapping(#[source] Error),

    #[error("ensure pending build exists: {0}")]
    EnsurePendingBuildExists(#[source] Error),

    #[error("set has new inputs: {0}")]
    SetHasNewInputs(#[source] Error),

    #[error("get pending builds: {0}")]
    GetPendingBuilds(#[source] Error),

    #[error("finish aborted build: {0}")]
    FinishAbortedBuild(#[source] Error),

    #[error("schedule build: {0}")]
    ScheduleBuild(#[source] Error),

    #[error("get build inputs: {0}")]
    GetBuildInputs(#[source] Error),

    #[error("compute inputs: {0}")]
    ComputeInputs(#[source] Error),

    #[error("request schedule: {0}")]
    RequestSchedule(#[source] Error),

    #[error("mark build errored: {0}")]
    MarkErrored(#[source] Error),

    #[error("mark build aborted: {0}")]
    MarkAborted(#[source] Error),
}

impl SchedulerError {
    /// Whether the error should stop the pipeline's runner rather than be
    /// retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::PipelineRemoved(_))
    }
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
