//! Per-pipeline scheduling loop.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempo_core::{Job, JobId, Pipeline, RelatedJobs, VersionsDb};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::guard::{HeldLock, JobGuard};
use crate::interval::IntervalRunner;
use crate::metrics::Metrics;
use crate::scheduler::Scheduler;
use crate::starter::StartOutcome;
use crate::{SchedulerError, SchedulerResult};

/// Why a job was not scheduled this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Another instance holds the job's scheduling lock.
    LockHeld,
    LockError(String),
    JobDeleted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Scheduled(StartOutcome),
    Skipped(SkipReason),
    Failed(String),
}

impl JobOutcome {
    /// The pass covered everything requested so far, so the job is not
    /// scheduled again until something new asks for it.
    pub fn is_complete(&self) -> bool {
        matches!(self, JobOutcome::Scheduled(outcome) if !outcome.needs_retry)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub job: String,
    pub outcome: JobOutcome,
}

/// Everything that happened in one tick of a pipeline. Jobs with no
/// outstanding schedule request are left out.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub pipeline: String,
    pub jobs: Vec<JobReport>,
    pub duration: Duration,
}

impl TickReport {
    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|report| report.job == name)
    }

    /// Builds started this tick, across all jobs.
    pub fn started(&self) -> usize {
        self.jobs
            .iter()
            .map(|report| match &report.outcome {
                JobOutcome::Scheduled(outcome) => outcome.started.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Schedules the jobs of one pipeline on every tick.
pub struct Runner {
    pipeline: Arc<dyn Pipeline>,
    scheduler: Arc<Scheduler>,
    guard: JobGuard,
    interval: Duration,
    metrics: Arc<dyn Metrics>,
}

impl Runner {
    /// `interval` is both the tick period and the scheduling lock TTL.
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        scheduler: Arc<Scheduler>,
        guard: JobGuard,
        interval: Duration,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            pipeline,
            scheduler,
            guard,
            interval,
            metrics,
        }
    }

    pub fn pipeline(&self) -> &Arc<dyn Pipeline> {
        &self.pipeline
    }

    /// Tick until cancelled or the pipeline is removed.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        ready: Option<oneshot::Sender<()>>,
        noop: bool,
    ) -> SchedulerResult<()> {
        let runner = IntervalRunner::new(self.pipeline.name(), self.interval)?.noop(noop);

        runner
            .run(cancel, ready, |ctx| async move {
                let report = self.tick(&ctx).await?;
                debug!(
                    pipeline = %report.pipeline,
                    jobs = report.jobs.len(),
                    started = report.started(),
                    "Tick finished"
                );
                Ok::<(), SchedulerError>(())
            })
            .await
    }

    /// Run one scheduling pass over the pipeline's jobs that asked for one.
    ///
    /// Jobs are scheduled concurrently and joined before returning. Only
    /// pipeline-level failures fail the tick; per-job failures are reported.
    /// A job's last-scheduled time moves up to the request it was picked
    /// for only when its pass completed without needing a retry.
    pub async fn tick(&self, cancel: &CancellationToken) -> SchedulerResult<TickReport> {
        let started_at = Instant::now();
        let name = self.pipeline.name().to_string();

        let exists = self
            .pipeline
            .reload()
            .await
            .map_err(SchedulerError::ReloadPipeline)?;
        if !exists {
            info!(pipeline = %name, "Pipeline removed");
            return Err(SchedulerError::PipelineRemoved(name));
        }

        let load_started = Instant::now();
        let versions = self
            .pipeline
            .load_versions_db()
            .await
            .map_err(SchedulerError::LoadVersionsDb)?;
        let load_duration = load_started.elapsed();

        let jobs = self
            .pipeline
            .jobs()
            .await
            .map_err(SchedulerError::LoadJobs)?;

        let related_jobs: Arc<RelatedJobs> =
            Arc::new(jobs.iter().map(|j| (j.name().to_string(), j.id())).collect());

        let (due, idle): (Vec<_>, Vec<_>) = jobs.into_iter().partition(|job| job.needs_scheduling());
        if !idle.is_empty() {
            debug!(pipeline = %name, due = due.len(), idle = idle.len(), "Jobs not due for scheduling");
        }

        let mut reports = Vec::with_capacity(due.len());
        let mut tasks = JoinSet::new();

        for job in due {
            if cancel.is_cancelled() {
                reports.push(report(job.as_ref(), JobOutcome::Skipped(SkipReason::Cancelled)));
                continue;
            }

            let lock = match job.acquire_scheduling_lock(self.interval).await {
                Ok(Some(lock)) => HeldLock::new(lock),
                Ok(None) => {
                    debug!(pipeline = %name, job = %job.name(), "Scheduling lock held elsewhere");
                    reports.push(report(job.as_ref(), JobOutcome::Skipped(SkipReason::LockHeld)));
                    continue;
                }
                Err(e) => {
                    warn!(pipeline = %name, job = %job.name(), error = %e, "Failed to acquire scheduling lock");
                    reports.push(report(
                        job.as_ref(),
                        JobOutcome::Skipped(SkipReason::LockError(e.to_string())),
                    ));
                    continue;
                }
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    lock.release().await;
                    reports.push(report(job.as_ref(), JobOutcome::Skipped(SkipReason::Cancelled)));
                    continue;
                }
                permit = self.guard.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        lock.release().await;
                        reports.push(report(job.as_ref(), JobOutcome::Failed(e.to_string())));
                        continue;
                    }
                },
            };

            let pipeline = Arc::clone(&self.pipeline);
            let scheduler = Arc::clone(&self.scheduler);
            let metrics = Arc::clone(&self.metrics);
            let versions = Arc::clone(&versions);
            let related_jobs = Arc::clone(&related_jobs);
            // Captured before the job reloads: requests made during the pass
            // stay outstanding.
            let requested = job.schedule_requested_time();

            tasks.spawn(async move {
                metrics.load_versions_duration(pipeline.name(), job.name(), load_duration);

                let outcome = AssertUnwindSafe(schedule_job(
                    pipeline.as_ref(),
                    scheduler.as_ref(),
                    &versions,
                    job.as_ref(),
                    &related_jobs,
                ))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(pipeline = %pipeline.name(), job = %job.name(), panic = %message, "Job scheduling panicked");
                    JobOutcome::Failed(SchedulerError::Panicked(message).to_string())
                });

                if outcome.is_complete() {
                    if let Err(e) = job.update_last_scheduled(requested).await {
                        error!(pipeline = %pipeline.name(), job = %job.name(), error = %e, "Failed to update last scheduled");
                    }
                }

                lock.release().await;
                drop(permit);
                report(job.as_ref(), outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(job_report) => reports.push(job_report),
                Err(e) => error!(pipeline = %name, error = %e, "Job scheduling task failed"),
            }
        }

        let duration = started_at.elapsed();
        self.metrics.full_scheduling_duration(&name, duration);

        Ok(TickReport {
            pipeline: name,
            jobs: reports,
            duration,
        })
    }
}

async fn schedule_job(
    pipeline: &dyn Pipeline,
    scheduler: &Scheduler,
    versions: &VersionsDb,
    job: &dyn Job,
    related_jobs: &RelatedJobs,
) -> JobOutcome {
    let exists = match job.reload().await {
        Ok(exists) => exists,
        Err(e) => {
            let e = SchedulerError::ReloadJob(e);
            error!(pipeline = %pipeline.name(), job = %job.name(), error = %e, "Failed to schedule job");
            return JobOutcome::Failed(e.to_string());
        }
    };
    if !exists {
        debug!(pipeline = %pipeline.name(), job = %job.name(), "Job deleted");
        return JobOutcome::Skipped(SkipReason::JobDeleted);
    }

    let resources = match pipeline.resources().await {
        Ok(resources) => resources,
        Err(e) => {
            let e = SchedulerError::LoadResources(e);
            error!(pipeline = %pipeline.name(), job = %job.name(), error = %e, "Failed to schedule job");
            return JobOutcome::Failed(e.to_string());
        }
    };

    match scheduler
        .schedule(pipeline, versions, job, &resources, related_jobs)
        .await
    {
        Ok(outcome) => JobOutcome::Scheduled(outcome),
        Err(e) => {
            error!(pipeline = %pipeline.name(), job = %job.name(), error = %e, "Failed to schedule job");
            JobOutcome::Failed(e.to_string())
        }
    }
}

fn report(job: &dyn Job, outcome: JobOutcome) -> JobReport {
    JobReport {
        job_id: job.id(),
        job: job.name().to_string(),
        outcome,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
