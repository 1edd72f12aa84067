mod common;

use async_trait::async_trait;
use common::Fixture;
use std::sync::Arc;
use tempo_core::versions::version;
use tempo_core::{
    Algorithm, BuildFactory, BuildStatus, Engine, InputComputation, InputMapper, InstanceId, Job,
    JobConfig, Pipeline, Plan, RelatedJobs, Resources, Result, VersionsDb,
};
use tempo_scheduler::{
    BuildStarter, FreshAlgorithm, Scheduler, SchedulerError, SnapshotInputMapper, TracingMetrics,
};

#[tokio::test]
async fn test_new_trigger_version_creates_and_starts_build() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", true);

    let outcome = f.schedule(job).await.unwrap();

    let builds = f.store.builds_of(job);
    assert_eq!(builds.len(), 1);
    assert_eq!(outcome.started, vec![builds[0].id]);
    assert_eq!(builds[0].status, BuildStatus::Started);
    assert!(f.store.job_record(job).unwrap().has_new_inputs);
}

#[tokio::test]
async fn test_non_trigger_version_only_flags_new_inputs() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", false);

    let outcome = f.schedule(job).await.unwrap();

    assert!(outcome.started.is_empty());
    assert!(f.store.builds_of(job).is_empty());
    assert!(f.store.job_record(job).unwrap().has_new_inputs);
}

#[tokio::test]
async fn test_rescheduling_without_changes_is_idempotent() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", true);

    f.schedule(job).await.unwrap();
    // The started build consumed v1, so nothing is new any more.
    f.schedule(job).await.unwrap();
    let record = f.store.job_record(job).unwrap();
    assert!(!record.has_new_inputs);
    let updates = record.has_new_inputs_updates;

    let outcome = f.schedule(job).await.unwrap();

    assert!(outcome.started.is_empty());
    assert_eq!(f.store.builds_of(job).len(), 1);
    assert_eq!(f.store.job_record(job).unwrap().has_new_inputs_updates, updates);
}

#[tokio::test]
async fn test_next_trigger_version_starts_next_build() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", true);
    f.schedule(job).await.unwrap();

    f.store.save_version(f.repo, version([("ref", "v2")])).unwrap();
    let outcome = f.schedule(job).await.unwrap();

    let builds = f.store.builds_of(job);
    assert_eq!(builds.len(), 2);
    assert_eq!(outcome.started, vec![builds[1].id]);
    assert_eq!(builds[1].inputs[0].version, version([("ref", "v2")]));
}

#[tokio::test]
async fn test_existing_pending_build_is_not_duplicated() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", true);
    f.store.set_job_paused(job, true).unwrap();

    f.schedule(job).await.unwrap();
    f.store.save_version(f.repo, version([("ref", "v2")])).unwrap();
    f.schedule(job).await.unwrap();

    let builds = f.store.builds_of(job);
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].status, BuildStatus::Pending);
}

#[tokio::test]
async fn test_schedule_jobs_isolates_job_failures() {
    let f = Fixture::new();
    let unit = f.add_repo_job("unit", true);
    let broken = f.add_repo_job("broken", true);

    let jobs = f.pipeline.jobs().await.unwrap();
    f.store.delete_job(broken).unwrap();

    let versions = f.pipeline.load_versions_db().await.unwrap();
    let resources = f.pipeline.resources().await.unwrap();
    let reports = f
        .scheduler()
        .schedule_jobs(
            f.pipeline.as_ref(),
            &versions,
            &jobs,
            &resources,
            &RelatedJobs::new(),
        )
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    let unit_report = reports.iter().find(|r| r.job_id == unit).unwrap();
    let started = &unit_report.result.as_ref().unwrap().started;
    assert_eq!(started.len(), 1);

    let broken_report = reports.iter().find(|r| r.job_id == broken).unwrap();
    assert!(matches!(
        broken_report.result,
        Err(SchedulerError::SaveNextInputMapping(_))
    ));
}

/// Resolves like the fresh algorithm but always reports more candidates.
struct ExploringAlgorithm(FreshAlgorithm);

#[async_trait]
impl Algorithm for ExploringAlgorithm {
    async fn compute(
        &self,
        job: &dyn Job,
        resources: &Resources,
        related_jobs: &RelatedJobs,
    ) -> Result<InputComputation> {
        let mut computation = self.0.compute(job, resources, related_jobs).await?;
        computation.has_next = true;
        Ok(computation)
    }
}

#[tokio::test]
async fn test_manual_build_with_more_candidates_requests_schedule() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", false);
    let build = f.store.create_manual_build(job).unwrap();
    f.mark_checked(f.repo);

    let starter = BuildStarter::new(
        Arc::clone(&f.factory) as Arc<dyn BuildFactory>,
        Arc::clone(&f.engine) as Arc<dyn Engine>,
        Arc::new(ExploringAlgorithm(FreshAlgorithm::new(Arc::clone(&f.pipeline)))),
    );
    let scheduler = Scheduler::new(
        Arc::new(SnapshotInputMapper),
        starter,
        Arc::new(TracingMetrics),
    );

    let job_handle = f.job(job).await;
    let versions = f.pipeline.load_versions_db().await.unwrap();
    let resources = f.pipeline.resources().await.unwrap();
    f.settle(job).await;
    let outcome = scheduler
        .schedule(
            f.pipeline.as_ref(),
            &versions,
            job_handle.as_ref(),
            &resources,
            &RelatedJobs::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.started, vec![build]);
    assert!(f.is_due(job));
}

/// Saves mappings like the snapshot mapper but always reports more candidates.
struct ExploringMapper;

#[async_trait]
impl InputMapper for ExploringMapper {
    async fn save_next_input_mapping(
        &self,
        versions: &VersionsDb,
        job: &dyn Job,
        resources: &Resources,
    ) -> Result<InputComputation> {
        let mut computation = SnapshotInputMapper
            .save_next_input_mapping(versions, job, resources)
            .await?;
        computation.has_next = true;
        Ok(computation)
    }
}

#[tokio::test]
async fn test_mapping_with_more_candidates_requests_schedule() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", false);
    f.settle(job).await;
    let scheduler = Scheduler::new(Arc::new(ExploringMapper), f.starter(), Arc::new(TracingMetrics));

    let job_handle = f.job(job).await;
    let versions = f.pipeline.load_versions_db().await.unwrap();
    let resources = f.pipeline.resources().await.unwrap();
    let outcome = scheduler
        .schedule(
            f.pipeline.as_ref(),
            &versions,
            job_handle.as_ref(),
            &resources,
            &RelatedJobs::new(),
        )
        .await
        .unwrap();

    assert!(outcome.started.is_empty());
    assert!(f.store.builds_of(job).is_empty());
    assert!(f.is_due(job));
}

#[tokio::test]
async fn test_manual_build_on_pinned_resource_skips_check_wait() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", false);
    f.store.save_version(f.repo, version([("ref", "v2")])).unwrap();
    f.store
        .pin_resource(f.repo, Some(version([("ref", "v1")])))
        .unwrap();
    // Never checked: an unpinned input would hold the build back.
    let build = f.store.create_manual_build(job).unwrap();

    let outcome = f.schedule(job).await.unwrap();

    assert_eq!(outcome.started, vec![build]);
    assert!(!outcome.needs_retry);
    let record = f.store.build_record(build).unwrap();
    assert_eq!(record.status, BuildStatus::Started);
    assert_eq!(record.inputs[0].version, version([("ref", "v1")]));
}

#[tokio::test]
async fn test_manual_build_with_missing_resource_stays_pending() {
    let f = Fixture::new();
    let job = f.add_job(JobConfig::new("unit").with_get("image", false));
    let build = f.store.create_manual_build(job).unwrap();
    f.mark_checked(f.repo);

    let outcome = f.schedule(job).await.unwrap();

    assert!(outcome.started.is_empty());
    assert!(!outcome.needs_retry);
    assert_eq!(f.status(build), BuildStatus::Pending);
    assert!(f.engine.created().is_empty());
}

#[tokio::test]
async fn test_build_claimed_by_another_instance_is_left_to_it() {
    let f = Fixture::new();
    let job = f.add_repo_job("unit", false);
    let build = f.store.create_build(job).unwrap();
    let stale = f.job(job).await.get_pending_builds().await.unwrap().remove(0);

    let other = f.store.with_owner(InstanceId::new());
    let other_job = other
        .pipeline(f.pipeline_id)
        .unwrap()
        .jobs()
        .await
        .unwrap()
        .into_iter()
        .find(|j| j.id() == job)
        .unwrap();
    let other_build = other_job.get_pending_builds().await.unwrap().remove(0);
    assert!(other_job.schedule_build(other_build.as_ref()).await.unwrap());

    let outcome = f.schedule(job).await.unwrap();
    assert!(outcome.started.is_empty());
    assert!(outcome.needs_retry);
    assert_eq!(f.status(build), BuildStatus::Pending);
    assert!(f.engine.created().is_empty());

    assert!(other_build.start(&Plan::Do(vec![])).await.unwrap());
    // A handle loaded before the other instance started the build.
    stale.finish(BuildStatus::Aborted).await.unwrap();
    assert_eq!(f.status(build), BuildStatus::Started);

    let outcome = f.schedule(job).await.unwrap();
    assert!(outcome.started.is_empty());
    assert!(!outcome.needs_retry);
}
