//! Reference input resolution.
//!
//! For each job input, pick a version of its resource:
//! the input's own pin, else the resource's pin, else the newest version
//! (or, for `every` inputs, the oldest version the job has not used yet).
//! Candidates must have passed through a successful build of every job
//! listed in `passed`. A version is a first occurrence when no earlier build
//! of the job consumed it for that input.

use async_trait::async_trait;
use std::sync::Arc;
use tempo_core::versions::SavedVersion;
use tempo_core::{
    Algorithm, InputComputation, InputMapper, InputMapping, InputResult, Job, JobId,
    JobInputConfig, Pipeline, RelatedJobs, ResolvedInput, Resources, Result, SchedulerResource,
    Version, VersionPolicy, VersionsDb,
};

/// Compute a job's next inputs from `versions`.
///
/// `passed` job names are looked up in `related_jobs` first, then in the
/// snapshot. This resolver never has further candidates to explore.
pub fn resolve(
    versions: &VersionsDb,
    job: &dyn Job,
    resources: &Resources,
    related_jobs: &RelatedJobs,
) -> InputComputation {
    let mut mapping = InputMapping::new();

    for input in job.config().inputs() {
        let result = match resources.lookup(&input.resource) {
            Some(resource) => resolve_input(versions, job.id(), &input, resource, related_jobs),
            None => InputResult::Unresolved {
                reason: format!("resource '{}' not found", input.resource),
            },
        };
        mapping.insert(input.name.clone(), result);
    }

    let resolved = mapping.values().all(|r| r.resolved().is_some());
    InputComputation {
        mapping,
        resolved,
        has_next: false,
    }
}

fn resolve_input(
    versions: &VersionsDb,
    job_id: JobId,
    input: &JobInputConfig,
    resource: &SchedulerResource,
    related_jobs: &RelatedJobs,
) -> InputResult {
    let mut passed_jobs = Vec::with_capacity(input.passed.len());
    for name in &input.passed {
        match related_jobs
            .get(name)
            .copied()
            .or_else(|| versions.job_id(name))
        {
            Some(id) => passed_jobs.push(id),
            None => {
                return InputResult::Unresolved {
                    reason: format!("passed job '{}' not found", name),
                };
            }
        }
    }

    let satisfies = |candidate: &Version| {
        passed_jobs
            .iter()
            .all(|&id| versions.passed_by(id, resource.id, candidate))
    };

    let pinned = match &input.version {
        VersionPolicy::Pinned(version) => Some(version),
        _ => resource.current_pinned_version(),
    };

    let chosen = match (pinned, &input.version) {
        (Some(version), _) => versions
            .versions_of(resource.id)
            .find(|v| &v.version == version && satisfies(&v.version)),
        (None, VersionPolicy::Every) => {
            let mut candidates: Vec<&SavedVersion> =
                versions.versions_of(resource.id).filter(|v| satisfies(&v.version)).collect();
            candidates.reverse();
            candidates
                .iter()
                .find(|v| !versions.used_by_job(job_id, &input.name, resource.id, &v.version))
                .or_else(|| candidates.last())
                .copied()
        }
        (None, _) => versions
            .versions_of(resource.id)
            .find(|v| satisfies(&v.version)),
    };

    match chosen {
        Some(candidate) => InputResult::Resolved(ResolvedInput {
            resource_id: resource.id,
            version: candidate.version.clone(),
            first_occurrence: !versions.used_by_job(
                job_id,
                &input.name,
                resource.id,
                &candidate.version,
            ),
        }),
        None if pinned.is_some() => InputResult::Unresolved {
            reason: format!("pinned version of '{}' not available", resource.name),
        },
        None => InputResult::Unresolved {
            reason: format!("no satisfiable versions of '{}'", resource.name),
        },
    }
}

/// Resolves against the tick's shared snapshot and saves the result on the job.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotInputMapper;

#[async_trait]
impl InputMapper for SnapshotInputMapper {
    async fn save_next_input_mapping(
        &self,
        versions: &VersionsDb,
        job: &dyn Job,
        resources: &Resources,
    ) -> Result<InputComputation> {
        let computation = resolve(versions, job, resources, &RelatedJobs::new());
        job.save_next_input_mapping(&computation.mapping, computation.resolved)
            .await?;
        Ok(computation)
    }
}

/// Resolves against a snapshot loaded fresh from the pipeline on every call.
pub struct FreshAlgorithm {
    pipeline: Arc<dyn Pipeline>,
}

impl FreshAlgorithm {
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Algorithm for FreshAlgorithm {
    async fn compute(
        &self,
        job: &dyn Job,
        resources: &Resources,
        related_jobs: &RelatedJobs,
    ) -> Result<InputComputation> {
        let versions = self.pipeline.load_versions_db().await?;
        Ok(resolve(&versions, job, resources, related_jobs))
    }
}
