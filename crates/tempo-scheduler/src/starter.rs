//! Starting a job's pending builds.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempo_core::{
    Algorithm, Build, BuildFactory, BuildId, BuildStatus, Engine, Job, Pipeline, RelatedJobs,
    Resources,
};
use tracing::{debug, error, info, warn};

use crate::strategy::{BuildInputs, BuildStartStrategy, StrategyContext, strategy_for};
use crate::{SchedulerError, SchedulerResult};

/// Result of one pass over a job's pending builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    /// Builds handed to the engine, in start order.
    pub started: Vec<BuildId>,
    /// The pass stopped on a condition expected to clear soon: the claim was
    /// refused, or a manually triggered build is waiting for resource checks.
    pub needs_retry: bool,
}

/// How handling one build ended.
enum Step {
    Started,
    /// Aborted build finished; move on to the next build.
    Finished,
    /// Leave this and every later build pending until the next tick.
    Stop { needs_retry: bool },
}

/// Starts pending builds strictly in order, stopping at the first build that
/// does not start.
pub struct BuildStarter {
    factory: Arc<dyn BuildFactory>,
    engine: Arc<dyn Engine>,
    algorithm: Arc<dyn Algorithm>,
}

impl BuildStarter {
    pub fn new(
        factory: Arc<dyn BuildFactory>,
        engine: Arc<dyn Engine>,
        algorithm: Arc<dyn Algorithm>,
    ) -> Self {
        Self {
            factory,
            engine,
            algorithm,
        }
    }

    /// Try to start `pending` (one job's pending builds, in start order).
    ///
    /// Aborted builds are finished and skipped. Any other build that does
    /// not start ends the pass: later builds are not attempted until the
    /// next call.
    pub async fn try_start_pending_builds_for_job(
        &self,
        pipeline: &dyn Pipeline,
        job: &dyn Job,
        resources: &Resources,
        related_jobs: &RelatedJobs,
        pending: &[Arc<dyn Build>],
    ) -> SchedulerResult<StartOutcome> {
        let ctx = StrategyContext {
            job,
            resources,
            related_jobs,
            algorithm: self.algorithm.as_ref(),
        };

        let mut outcome = StartOutcome::default();
        for build in pending {
            let strategy = strategy_for(Arc::clone(build), ctx);

            match self
                .try_start_pending_build(pipeline, job, resources, strategy.as_ref())
                .await?
            {
                Step::Started => outcome.started.push(build.id()),
                Step::Finished => {}
                Step::Stop { needs_retry } => {
                    outcome.needs_retry = needs_retry;
                    break;
                }
            }
        }

        Ok(outcome)
    }

    async fn try_start_pending_build(
        &self,
        pipeline: &dyn Pipeline,
        job: &dyn Job,
        resources: &Resources,
        strategy: &dyn BuildStartStrategy,
    ) -> SchedulerResult<Step> {
        let build = strategy.build();

        if build.is_aborted() {
            build
                .finish(BuildStatus::Aborted)
                .await
                .map_err(SchedulerError::FinishAbortedBuild)?;
            debug!(job = %job.name(), build = %build.id(), "Finished aborted build");
            return Ok(Step::Finished);
        }

        let pipeline_paused = pipeline
            .check_paused()
            .await
            .map_err(SchedulerError::CheckPaused)?;
        if pipeline_paused || job.paused() {
            debug!(job = %job.name(), build = %build.id(), "Paused, leaving build pending");
            return Ok(Step::Stop { needs_retry: false });
        }

        let claimed = job
            .schedule_build(build.as_ref())
            .await
            .map_err(SchedulerError::ScheduleBuild)?;
        if !claimed {
            debug!(job = %job.name(), build = %build.id(), "Build not claimed");
            return Ok(Step::Stop { needs_retry: true });
        }

        let inputs = match strategy.resolve_inputs().await? {
            BuildInputs::Found(inputs) => inputs,
            BuildInputs::NotFound => {
                debug!(
                    job = %job.name(),
                    build = %build.id(),
                    strategy = %strategy.kind(),
                    "Build inputs not ready"
                );
                return Ok(Step::Stop { needs_retry: false });
            }
            BuildInputs::AwaitingCheck => return Ok(Step::Stop { needs_retry: true }),
        };

        let resource_types = pipeline
            .resource_types()
            .await
            .map_err(SchedulerError::LoadResourceTypes)?;

        let plan = match self.factory.create(
            &job.config(),
            &resources.configs(),
            &resource_types,
            &inputs,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                error!(job = %job.name(), build = %build.id(), error = %e, "Failed to create build plan");
                build
                    .finish(BuildStatus::Errored)
                    .await
                    .map_err(SchedulerError::MarkErrored)?;
                return Ok(Step::Stop { needs_retry: false });
            }
        };

        match build.start(&plan).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job = %job.name(), build = %build.id(), "Build could not be started");
                build
                    .finish(BuildStatus::Aborted)
                    .await
                    .map_err(SchedulerError::MarkAborted)?;
                return Ok(Step::Stop { needs_retry: false });
            }
            Err(e) => {
                warn!(job = %job.name(), build = %build.id(), error = %e, "Failed to start build");
                return Ok(Step::Stop { needs_retry: false });
            }
        }

        info!(
            pipeline = %pipeline.name(),
            job = %job.name(),
            build = %build.name(),
            build_id = %build.id(),
            "Build started"
        );

        match self.engine.create_build(Arc::clone(build), plan).await {
            Ok(running) => {
                tokio::spawn(running.resume());
            }
            Err(e) => {
                error!(
                    engine = self.engine.name(),
                    build = %build.id(),
                    error = %e,
                    "Failed to hand build to engine"
                );
            }
        }

        Ok(Step::Started)
    }
}
