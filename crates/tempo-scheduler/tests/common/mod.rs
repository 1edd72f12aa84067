//! Shared fixtures for scheduler tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempo_core::plan::GetPlan;
use tempo_core::versions::version;
use tempo_core::{
    Build, BuildFactory, BuildId, BuildInput, BuildStatus, Engine, Error, InputMapping, Job,
    JobConfig, JobId, Lock, Pipeline, PipelineId, Plan, RelatedJobs, ResourceConfig, ResourceId,
    ResourceType, Resources, Result, RunningBuild, SchedulerResource, VersionsDb,
};
use tempo_db::MemoryStore;
use tempo_scheduler::{
    BuildStarter, FreshAlgorithm, JobGuard, Metrics, Runner, Scheduler, SchedulerResult,
    SnapshotInputMapper, StartOutcome, TracingMetrics,
};

/// Compiles a `get` per input. Can be told to fail or to panic for one job.
#[derive(Default)]
pub struct FakeFactory {
    pub fail: AtomicBool,
    pub panic_for: Option<String>,
}

impl FakeFactory {
    pub fn panicking_for(job: &str) -> Self {
        Self {
            fail: AtomicBool::new(false),
            panic_for: Some(job.to_string()),
        }
    }
}

impl BuildFactory for FakeFactory {
    fn create(
        &self,
        job: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[ResourceType],
        inputs: &[BuildInput],
    ) -> Result<Plan> {
        if self.panic_for.as_deref() == Some(job.name.as_str()) {
            panic!("factory exploded for {}", job.name);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Plan("unknown resource type".to_string()));
        }

        let gets = inputs
            .iter()
            .map(|input| {
                let resource = resources.iter().find(|r| r.name == input.name);
                Plan::Get(GetPlan {
                    name: input.name.clone(),
                    resource: input.name.clone(),
                    type_: resource.map(|r| r.type_.clone()).unwrap_or_default(),
                    source: resource.map(|r| r.source.clone()).unwrap_or_default(),
                    version: Some(input.version.clone()),
                    resource_types: resource_types.to_vec(),
                })
            })
            .collect();
        Ok(Plan::Do(gets))
    }
}

/// Records every build handed over and every resumed build.
#[derive(Default)]
pub struct RecordingEngine {
    pub created: Mutex<Vec<BuildId>>,
    pub resumed: Arc<Mutex<Vec<BuildId>>>,
}

impl RecordingEngine {
    pub fn created(&self) -> Vec<BuildId> {
        self.created.lock().unwrap().clone()
    }

    pub async fn resumed(&self) -> Vec<BuildId> {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        self.resumed.lock().unwrap().clone()
    }
}

struct RecordedRun {
    id: BuildId,
    resumed: Arc<Mutex<Vec<BuildId>>>,
}

#[async_trait]
impl RunningBuild for RecordedRun {
    fn build_id(&self) -> BuildId {
        self.id
    }

    async fn resume(self: Box<Self>) {
        self.resumed.lock().unwrap().push(self.id);
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn create_build(&self, build: Arc<dyn Build>, _plan: Plan) -> Result<Box<dyn RunningBuild>> {
        self.created.lock().unwrap().push(build.id());
        Ok(Box::new(RecordedRun {
            id: build.id(),
            resumed: Arc::clone(&self.resumed),
        }))
    }
}

/// Delegates to a real build but overrides `start`.
pub struct StartOverride {
    pub inner: Arc<dyn Build>,
    /// `Some(accepted)` to return a value, `None` to fail.
    pub result: Option<bool>,
}

#[async_trait]
impl Build for StartOverride {
    fn id(&self) -> BuildId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn job_id(&self) -> JobId {
        self.inner.job_id()
    }

    fn status(&self) -> BuildStatus {
        self.inner.status()
    }

    fn is_aborted(&self) -> bool {
        self.inner.is_aborted()
    }

    fn is_manually_triggered(&self) -> bool {
        self.inner.is_manually_triggered()
    }

    fn rerun_of(&self) -> BuildId {
        self.inner.rerun_of()
    }

    fn is_scheduled(&self) -> bool {
        self.inner.is_scheduled()
    }

    fn create_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.create_time()
    }

    fn is_newer_than_last_check_of(&self, resource: &SchedulerResource) -> bool {
        self.inner.is_newer_than_last_check_of(resource)
    }

    async fn finish(&self, status: BuildStatus) -> Result<()> {
        self.inner.finish(status).await
    }

    async fn start(&self, _plan: &Plan) -> Result<bool> {
        self.result
            .ok_or_else(|| Error::Storage("connection reset".to_string()))
    }

    async fn adopt_inputs_and_pipes(&self) -> Result<Option<Vec<BuildInput>>> {
        self.inner.adopt_inputs_and_pipes().await
    }

    async fn adopt_rerun_inputs_and_pipes(&self) -> Result<Option<Vec<BuildInput>>> {
        self.inner.adopt_rerun_inputs_and_pipes().await
    }
}

/// Records which jobs reported a versions load.
#[derive(Default)]
pub struct RecordingMetrics {
    pub loads: Mutex<Vec<(String, String)>>,
}

impl Metrics for RecordingMetrics {
    fn full_scheduling_duration(&self, _pipeline: &str, _duration: Duration) {}

    fn load_versions_duration(&self, pipeline: &str, job: &str, _duration: Duration) {
        self.loads
            .lock()
            .unwrap()
            .push((pipeline.to_string(), job.to_string()));
    }

    fn job_scheduling_duration(&self, _pipeline: &str, _job: &str, _duration: Duration) {}
}

/// How a [`FlakyPipeline`] breaks its chosen job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    LockError,
    ReloadError,
    Deleted,
}

/// Delegates to a real pipeline, but hands out one job that fails.
pub struct FlakyPipeline {
    pub inner: Arc<dyn Pipeline>,
    pub job: String,
    pub fault: Fault,
}

#[async_trait]
impl Pipeline for FlakyPipeline {
    fn id(&self) -> PipelineId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn reload(&self) -> Result<bool> {
        self.inner.reload().await
    }

    async fn check_paused(&self) -> Result<bool> {
        self.inner.check_paused().await
    }

    async fn load_versions_db(&self) -> Result<Arc<VersionsDb>> {
        self.inner.load_versions_db().await
    }

    async fn jobs(&self) -> Result<Vec<Arc<dyn Job>>> {
        let jobs = self.inner.jobs().await?;
        Ok(jobs
            .into_iter()
            .map(|job| {
                if job.name() == self.job {
                    Arc::new(FlakyJob {
                        inner: job,
                        fault: self.fault,
                    }) as Arc<dyn Job>
                } else {
                    job
                }
            })
            .collect())
    }

    async fn resources(&self) -> Result<Resources> {
        self.inner.resources().await
    }

    async fn resource_types(&self) -> Result<Vec<ResourceType>> {
        self.inner.resource_types().await
    }

    async fn pending_builds(&self) -> Result<HashMap<JobId, Vec<Arc<dyn Build>>>> {
        self.inner.pending_builds().await
    }
}

struct FlakyJob {
    inner: Arc<dyn Job>,
    fault: Fault,
}

fn connection_reset() -> Error {
    Error::Storage("connection reset".to_string())
}

#[async_trait]
impl Job for FlakyJob {
    fn id(&self) -> JobId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pipeline_id(&self) -> PipelineId {
        self.inner.pipeline_id()
    }

    fn pipeline_name(&self) -> &str {
        self.inner.pipeline_name()
    }

    fn config(&self) -> JobConfig {
        self.inner.config()
    }

    fn paused(&self) -> bool {
        self.inner.paused()
    }

    fn has_new_inputs(&self) -> bool {
        self.inner.has_new_inputs()
    }

    fn schedule_requested_time(&self) -> DateTime<Utc> {
        self.inner.schedule_requested_time()
    }

    fn last_scheduled(&self) -> DateTime<Utc> {
        self.inner.last_scheduled()
    }

    fn max_in_flight_reached(&self) -> bool {
        self.inner.max_in_flight_reached()
    }

    async fn reload(&self) -> Result<bool> {
        match self.fault {
            Fault::ReloadError => Err(connection_reset()),
            Fault::Deleted => Ok(false),
            Fault::LockError => self.inner.reload().await,
        }
    }

    async fn acquire_scheduling_lock(&self, ttl: Duration) -> Result<Option<Box<dyn Lock>>> {
        if self.fault == Fault::LockError {
            return Err(connection_reset());
        }
        self.inner.acquire_scheduling_lock(ttl).await
    }

    async fn schedule_build(&self, build: &dyn Build) -> Result<bool> {
        self.inner.schedule_build(build).await
    }

    async fn get_pending_builds(&self) -> Result<Vec<Arc<dyn Build>>> {
        self.inner.get_pending_builds().await
    }

    async fn ensure_pending_build_exists(&self) -> Result<()> {
        self.inner.ensure_pending_build_exists().await
    }

    async fn save_next_input_mapping(&self, mapping: &InputMapping, resolved: bool) -> Result<()> {
        self.inner.save_next_input_mapping(mapping, resolved).await
    }

    async fn set_has_new_inputs(&self, has_new_inputs: bool) -> Result<()> {
        self.inner.set_has_new_inputs(has_new_inputs).await
    }

    async fn request_schedule(&self) -> Result<()> {
        self.inner.request_schedule().await
    }

    async fn update_last_scheduled(&self, requested: DateTime<Utc>) -> Result<()> {
        self.inner.update_last_scheduled(requested).await
    }
}

/// A pipeline `main` with a `repo` resource that has one version.
pub struct Fixture {
    pub store: MemoryStore,
    pub pipeline_id: PipelineId,
    pub pipeline: Arc<dyn Pipeline>,
    pub repo: ResourceId,
    pub factory: Arc<FakeFactory>,
    pub engine: Arc<RecordingEngine>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_factory(FakeFactory::default())
    }

    pub fn with_factory(factory: FakeFactory) -> Self {
        let store = MemoryStore::new();
        let pipeline_id = store.add_pipeline("main");
        let repo = store.add_resource(pipeline_id, "repo", "git").unwrap();
        store.save_version(repo, version([("ref", "v1")])).unwrap();
        let pipeline = store.pipeline(pipeline_id).unwrap() as Arc<dyn Pipeline>;

        Self {
            store,
            pipeline_id,
            pipeline,
            repo,
            factory: Arc::new(factory),
            engine: Arc::new(RecordingEngine::default()),
        }
    }

    pub fn add_job(&self, config: JobConfig) -> JobId {
        self.store.add_job(self.pipeline_id, config).unwrap()
    }

    /// A job that gets `repo`, triggering or not.
    pub fn add_repo_job(&self, name: &str, trigger: bool) -> JobId {
        self.add_job(JobConfig::new(name).with_get("repo", trigger))
    }

    pub async fn job(&self, id: JobId) -> Arc<dyn Job> {
        self.pipeline
            .jobs()
            .await
            .unwrap()
            .into_iter()
            .find(|job| job.id() == id)
            .unwrap()
    }

    /// Record a check of `resource` that finished after every existing build.
    pub fn mark_checked(&self, resource: ResourceId) {
        self.store
            .set_last_checked(resource, chrono::Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
    }

    pub fn status(&self, build: BuildId) -> BuildStatus {
        self.store.build_record(build).unwrap().status
    }

    pub fn is_claimed(&self, build: BuildId) -> bool {
        self.store.build_record(build).unwrap().is_scheduled()
    }

    /// Request time covered by the job's last complete pass.
    pub fn last_scheduled(&self, job: JobId) -> DateTime<Utc> {
        self.store.job_record(job).unwrap().last_scheduled
    }

    pub fn is_due(&self, job: JobId) -> bool {
        self.store.job_record(job).unwrap().needs_scheduling()
    }

    /// Cover every schedule request the job has, as a complete pass would.
    pub async fn settle(&self, job_id: JobId) {
        let job = self.job(job_id).await;
        job.update_last_scheduled(job.schedule_requested_time())
            .await
            .unwrap();
    }

    pub fn starter(&self) -> BuildStarter {
        BuildStarter::new(
            Arc::clone(&self.factory) as Arc<dyn BuildFactory>,
            Arc::clone(&self.engine) as Arc<dyn Engine>,
            Arc::new(FreshAlgorithm::new(Arc::clone(&self.pipeline))),
        )
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            Arc::new(SnapshotInputMapper),
            self.starter(),
            Arc::new(TracingMetrics),
        )
    }

    pub fn runner(&self, guard: JobGuard) -> Runner {
        self.runner_for(
            Arc::clone(&self.pipeline),
            self.scheduler(),
            guard,
            Arc::new(TracingMetrics),
        )
    }

    pub fn runner_for(
        &self,
        pipeline: Arc<dyn Pipeline>,
        scheduler: Scheduler,
        guard: JobGuard,
        metrics: Arc<dyn Metrics>,
    ) -> Runner {
        Runner::new(
            pipeline,
            Arc::new(scheduler),
            guard,
            Duration::from_secs(10),
            metrics,
        )
    }

    /// Save the job's next inputs from a fresh snapshot, then try to start
    /// its pending builds.
    pub async fn start_pending(&self, job_id: JobId) -> StartOutcome {
        let job = self.job(job_id).await;
        let pending = self.prepare(job.as_ref()).await;
        self.start_builds(job_id, pending).await.unwrap()
    }

    /// Try to start exactly `builds` for the job.
    pub async fn start_builds(
        &self,
        job_id: JobId,
        builds: Vec<Arc<dyn Build>>,
    ) -> SchedulerResult<StartOutcome> {
        let job = self.job(job_id).await;
        let resources = self.pipeline.resources().await.unwrap();
        self.starter()
            .try_start_pending_builds_for_job(
                self.pipeline.as_ref(),
                job.as_ref(),
                &resources,
                &RelatedJobs::new(),
                &builds,
            )
            .await
    }

    /// Save the job's next inputs and return its pending builds.
    pub async fn prepare(&self, job: &dyn Job) -> Vec<Arc<dyn Build>> {
        use tempo_core::InputMapper;

        let versions = self.pipeline.load_versions_db().await.unwrap();
        let resources = self.pipeline.resources().await.unwrap();
        SnapshotInputMapper
            .save_next_input_mapping(&versions, job, &resources)
            .await
            .unwrap();
        job.get_pending_builds().await.unwrap()
    }

    pub async fn schedule(&self, job_id: JobId) -> SchedulerResult<StartOutcome> {
        let job = self.job(job_id).await;
        let versions = self.pipeline.load_versions_db().await.unwrap();
        let resources = self.pipeline.resources().await.unwrap();
        self.scheduler()
            .schedule(
                self.pipeline.as_ref(),
                &versions,
                job.as_ref(),
                &resources,
                &RelatedJobs::new(),
            )
            .await
    }
}
