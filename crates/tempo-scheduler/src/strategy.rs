//! How a pending build obtains its inputs.
//!
//! Every pending build is wrapped in a [`BuildStartStrategy`] chosen once by
//! [`StrategyKind::classify`]:
//!
//! | Kind | Selected when | Inputs come from |
//! |---|---|---|
//! | `ManualTrigger` | manually triggered | a fresh computation, once every unpinned input's resource has been checked since the build was created |
//! | `Rerun` | reruns another build | the original build's inputs |
//! | `Scheduler` | otherwise | the job's saved next inputs |

use async_trait::async_trait;
use derive_more::Display;
use std::sync::Arc;
use tempo_core::{Algorithm, Build, BuildInput, Job, RelatedJobs, Resources};
use tracing::debug;

use crate::{SchedulerError, SchedulerResult};

/// Which strategy applies to a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StrategyKind {
    #[display("manual-trigger")]
    ManualTrigger,
    #[display("rerun")]
    Rerun,
    #[display("scheduler")]
    Scheduler,
}

impl StrategyKind {
    /// Manual trigger takes precedence over rerun, which takes precedence
    /// over the default.
    pub fn classify(build: &dyn Build) -> Self {
        if build.is_manually_triggered() {
            StrategyKind::ManualTrigger
        } else if !build.rerun_of().is_none() {
            StrategyKind::Rerun
        } else {
            StrategyKind::Scheduler
        }
    }
}

/// Outcome of resolving a build's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildInputs {
    Found(Vec<BuildInput>),
    /// No usable inputs yet; the build waits for a later tick.
    NotFound,
    /// A resource has not been checked since the build was created.
    AwaitingCheck,
}

/// Produces the inputs a pending build starts with.
#[async_trait]
pub trait BuildStartStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn build(&self) -> &Arc<dyn Build>;

    async fn resolve_inputs(&self) -> SchedulerResult<BuildInputs>;
}

/// What a strategy may consult besides the build itself.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub job: &'a dyn Job,
    pub resources: &'a Resources,
    pub related_jobs: &'a RelatedJobs,
    pub algorithm: &'a dyn Algorithm,
}

/// Wrap a build in the strategy its attributes select.
pub fn strategy_for<'a>(
    build: Arc<dyn Build>,
    ctx: StrategyContext<'a>,
) -> Box<dyn BuildStartStrategy + 'a> {
    match StrategyKind::classify(build.as_ref()) {
        StrategyKind::ManualTrigger => Box::new(ManualTriggerBuild { build, ctx }),
        StrategyKind::Rerun => Box::new(RerunBuild { build }),
        StrategyKind::Scheduler => Box::new(SchedulerBuild { build }),
    }
}

fn found(inputs: Option<Vec<BuildInput>>) -> BuildInputs {
    match inputs {
        Some(inputs) => BuildInputs::Found(inputs),
        None => BuildInputs::NotFound,
    }
}

/// A build created by the scheduler for new trigger inputs.
pub struct SchedulerBuild {
    build: Arc<dyn Build>,
}

#[async_trait]
impl BuildStartStrategy for SchedulerBuild {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Scheduler
    }

    fn build(&self) -> &Arc<dyn Build> {
        &self.build
    }

    async fn resolve_inputs(&self) -> SchedulerResult<BuildInputs> {
        let inputs = self
            .build
            .adopt_inputs_and_pipes()
            .await
            .map_err(SchedulerError::GetBuildInputs)?;
        Ok(found(inputs))
    }
}

/// A rerun of an earlier build, reusing its exact inputs.
pub struct RerunBuild {
    build: Arc<dyn Build>,
}

#[async_trait]
impl BuildStartStrategy for RerunBuild {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rerun
    }

    fn build(&self) -> &Arc<dyn Build> {
        &self.build
    }

    async fn resolve_inputs(&self) -> SchedulerResult<BuildInputs> {
        let inputs = self
            .build
            .adopt_rerun_inputs_and_pipes()
            .await
            .map_err(SchedulerError::GetBuildInputs)?;
        Ok(found(inputs))
    }
}

/// A build a user asked for.
///
/// Waits until every unpinned input has been checked after the build was
/// created, then computes inputs directly instead of using the tick's
/// snapshot, since the snapshot may predate that check.
pub struct ManualTriggerBuild<'a> {
    build: Arc<dyn Build>,
    ctx: StrategyContext<'a>,
}

#[async_trait]
impl<'a> BuildStartStrategy for ManualTriggerBuild<'a> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ManualTrigger
    }

    fn build(&self) -> &Arc<dyn Build> {
        &self.build
    }

    async fn resolve_inputs(&self) -> SchedulerResult<BuildInputs> {
        let job = self.ctx.job;

        for input in job.config().inputs() {
            let Some(resource) = self.ctx.resources.lookup(&input.resource) else {
                debug!(
                    job = %job.name(),
                    build = %self.build.id(),
                    resource = %input.resource,
                    "Input resource not found"
                );
                return Ok(BuildInputs::NotFound);
            };

            if resource.current_pinned_version().is_some() {
                continue;
            }

            if self.build.is_newer_than_last_check_of(resource) {
                debug!(
                    job = %job.name(),
                    build = %self.build.id(),
                    resource = %resource.name,
                    "Waiting for resource check"
                );
                return Ok(BuildInputs::AwaitingCheck);
            }
        }

        let computation = self
            .ctx
            .algorithm
            .compute(job, self.ctx.resources, self.ctx.related_jobs)
            .await
            .map_err(SchedulerError::ComputeInputs)?;

        job.save_next_input_mapping(&computation.mapping, computation.resolved)
            .await
            .map_err(SchedulerError::SaveNextInputMapping)?;

        // More candidates remain; they are explored on the next tick.
        if computation.has_next {
            job.request_schedule()
                .await
                .map_err(SchedulerError::RequestSchedule)?;
        }

        let inputs = self
            .build
            .adopt_inputs_and_pipes()
            .await
            .map_err(SchedulerError::GetBuildInputs)?;
        Ok(found(inputs))
    }
}
