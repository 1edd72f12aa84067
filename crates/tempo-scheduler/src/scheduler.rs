//! Per-job scheduling.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tempo_core::{InputMapper, Job, JobId, Pipeline, RelatedJobs, Resources, VersionsDb};
use tracing::{debug, error};

use crate::metrics::Metrics;
use crate::starter::{BuildStarter, StartOutcome};
use crate::{SchedulerError, SchedulerResult};

/// Outcome of scheduling one job as part of a batch.
#[derive(Debug)]
pub struct JobSchedule {
    pub job_id: JobId,
    pub job: String,
    pub result: SchedulerResult<StartOutcome>,
    pub duration: Duration,
}

/// Creates pending builds for new trigger inputs, then starts pending builds.
pub struct Scheduler {
    input_mapper: Arc<dyn InputMapper>,
    starter: BuildStarter,
    metrics: Arc<dyn Metrics>,
}

impl Scheduler {
    pub fn new(
        input_mapper: Arc<dyn InputMapper>,
        starter: BuildStarter,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            input_mapper,
            starter,
            metrics,
        }
    }

    /// Schedule one job.
    pub async fn schedule(
        &self,
        pipeline: &dyn Pipeline,
        versions: &VersionsDb,
        job: &dyn Job,
        resources: &Resources,
        related_jobs: &RelatedJobs,
    ) -> SchedulerResult<StartOutcome> {
        let started_at = Instant::now();

        let result = self
            .schedule_job(pipeline, versions, job, resources, related_jobs)
            .await;

        self.metrics
            .job_scheduling_duration(pipeline.name(), job.name(), started_at.elapsed());
        result
    }

    async fn schedule_job(
        &self,
        pipeline: &dyn Pipeline,
        versions: &VersionsDb,
        job: &dyn Job,
        resources: &Resources,
        related_jobs: &RelatedJobs,
    ) -> SchedulerResult<StartOutcome> {
        self.ensure_pending_build_exists(versions, job, resources)
            .await?;

        let pending = job
            .get_pending_builds()
            .await
            .map_err(SchedulerError::GetPendingBuilds)?;

        self.starter
            .try_start_pending_builds_for_job(pipeline, job, resources, related_jobs, &pending)
            .await
    }

    /// Schedule every job in `jobs` with one pending-builds query.
    ///
    /// A failure for one job ends only that job's work. Only the batched
    /// pending-builds query failing fails the whole call.
    pub async fn schedule_jobs(
        &self,
        pipeline: &dyn Pipeline,
        versions: &VersionsDb,
        jobs: &[Arc<dyn Job>],
        resources: &Resources,
        related_jobs: &RelatedJobs,
    ) -> SchedulerResult<Vec<JobSchedule>> {
        let mut ensured = Vec::with_capacity(jobs.len());
        let mut reports = Vec::new();

        for job in jobs {
            let started_at = Instant::now();
            match self
                .ensure_pending_build_exists(versions, job.as_ref(), resources)
                .await
            {
                Ok(()) => ensured.push((job, started_at.elapsed())),
                Err(e) => {
                    error!(pipeline = %pipeline.name(), job = %job.name(), error = %e, "Failed to schedule job");
                    reports.push(self.report(pipeline, job.as_ref(), Err(e), started_at.elapsed()));
                }
            }
        }

        let mut pending = pipeline
            .pending_builds()
            .await
            .map_err(SchedulerError::GetPendingBuilds)?;

        for (job, elapsed) in ensured {
            let started_at = Instant::now();
            let builds = pending.remove(&job.id()).unwrap_or_default();

            let result = self
                .starter
                .try_start_pending_builds_for_job(
                    pipeline,
                    job.as_ref(),
                    resources,
                    related_jobs,
                    &builds,
                )
                .await;
            if let Err(e) = &result {
                error!(pipeline = %pipeline.name(), job = %job.name(), error = %e, "Failed to schedule job");
            }

            reports.push(self.report(pipeline, job.as_ref(), result, elapsed + started_at.elapsed()));
        }

        Ok(reports)
    }

    fn report(
        &self,
        pipeline: &dyn Pipeline,
        job: &dyn Job,
        result: SchedulerResult<StartOutcome>,
        duration: Duration,
    ) -> JobSchedule {
        self.metrics
            .job_scheduling_duration(pipeline.name(), job.name(), duration);
        JobSchedule {
            job_id: job.id(),
            job: job.name().to_string(),
            result,
            duration,
        }
    }

    /// Save the job's next inputs, create a pending build if a triggering
    /// input has a first-occurrence version, and track whether any input
    /// is new. A mapping with more candidates behind it asks for another
    /// pass of the job.
    async fn ensure_pending_build_exists(
        &self,
        versions: &VersionsDb,
        job: &dyn Job,
        resources: &Resources,
    ) -> SchedulerResult<()> {
        let computation = self
            .input_mapper
            .save_next_input_mapping(versions, job, resources)
            .await
            .map_err(SchedulerError::SaveNextInputMapping)?;
        let mapping = &computation.mapping;

        if computation.has_next {
            debug!(job = %job.name(), "More input candidates to explore");
            job.request_schedule()
                .await
                .map_err(SchedulerError::RequestSchedule)?;
        }

        for input in job.config().inputs() {
            let triggered = input.trigger
                && mapping
                    .get(&input.name)
                    .is_some_and(|result| result.is_first_occurrence());

            if triggered {
                debug!(job = %job.name(), input = %input.name, "New version of trigger input");
                job.ensure_pending_build_exists()
                    .await
                    .map_err(SchedulerError::EnsurePendingBuildExists)?;
                break;
            }
        }

        let has_new_inputs = mapping.values().any(|result| result.is_first_occurrence());
        if job.has_new_inputs() != has_new_inputs {
            job.set_has_new_inputs(has_new_inputs)
                .await
                .map_err(SchedulerError::SetHasNewInputs)?;
        }

        Ok(())
    }
}
