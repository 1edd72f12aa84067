//! In-memory store.
//!
//! A [`MemoryStore`] holds every table behind one mutex. Handles returned from
//! it ([`MemoryPipeline`], [`MemoryJob`], [`MemoryBuild`]) implement the
//! `tempo-core` storage traits and write through to the shared state, so
//! several handles (or several stores sharing state under different owners)
//! observe each other's changes like clients of one database.

pub mod build;
pub mod job;
pub mod lock;
pub mod pipeline;

pub use build::MemoryBuild;
pub use job::MemoryJob;
pub use lock::MemoryLock;
pub use pipeline::MemoryPipeline;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempo_core::{
    BuildId, BuildInput, BuildStatus, InputMapping, InstanceId, JobConfig, JobId, LockId, Plan,
    PipelineId, ResourceId, ResourceType, SchedulerResource, Version,
};
use tempo_core::versions::{BuildVersion, SavedVersion};
use tracing::debug;

use crate::{DbError, DbResult};

/// A pipeline row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub name: String,
    pub paused: bool,
}

/// A job row, including bookkeeping counters used to observe writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub pipeline_id: PipelineId,
    pub name: String,
    pub config: JobConfig,
    pub paused: bool,
    pub has_new_inputs: bool,
    /// Last saved next-input mapping and whether it fully resolved.
    pub next_inputs: Option<(InputMapping, bool)>,
    /// When a scheduling pass was last asked for.
    pub schedule_requested: DateTime<Utc>,
    /// Request time covered by the last complete scheduling pass.
    pub last_scheduled: DateTime<Utc>,
    /// Whether the last claim was refused for max-in-flight.
    pub max_in_flight_reached: bool,
    pub next_build_number: u64,
    pub mapping_saves: u64,
    pub has_new_inputs_updates: u64,
}

impl JobRecord {
    pub fn needs_scheduling(&self) -> bool {
        self.schedule_requested > self.last_scheduled
    }

    /// Request times only move forward, so a request is never lost to a
    /// pass that captured an equal timestamp.
    pub(crate) fn request_schedule(&mut self, now: DateTime<Utc>) {
        self.schedule_requested = now.max(self.schedule_requested + Duration::microseconds(1));
    }

    fn inputs_determined(&self) -> bool {
        matches!(self.next_inputs, Some((_, true)))
    }

    fn uses_resource(&self, name: &str) -> bool {
        self.config.inputs().iter().any(|input| input.resource == name)
    }

    fn shares_serial_group(&self, other: &JobRecord) -> bool {
        self.pipeline_id == other.pipeline_id
            && self
                .config
                .serial_groups
                .iter()
                .any(|g| other.config.serial_groups.contains(g))
    }

    fn has_passed_from(&self, job_name: &str) -> bool {
        self.config
            .inputs()
            .iter()
            .any(|input| input.passed.iter().any(|p| p == job_name))
    }
}

/// A build row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: BuildId,
    pub job_id: JobId,
    pub name: String,
    pub status: BuildStatus,
    /// Instance that claimed the build for starting.
    pub claimed_by: Option<InstanceId>,
    /// Abort was requested while pending.
    pub aborted: bool,
    pub manually_triggered: bool,
    pub rerun_of: BuildId,
    pub rerun_number: u64,
    pub create_time: DateTime<Utc>,
    pub inputs: Vec<BuildInput>,
    pub plan: Option<Plan>,
}

impl BuildRecord {
    /// Position in a job's pending queue: reruns sort right after their original.
    fn queue_key(&self) -> (BuildId, BuildId) {
        let group = if self.rerun_of.is_none() {
            self.id
        } else {
            self.rerun_of
        };
        (group, self.id)
    }

    pub fn is_scheduled(&self) -> bool {
        self.claimed_by.is_some()
    }

    fn occupies_slot(&self) -> bool {
        self.status == BuildStatus::Started
            || (self.status == BuildStatus::Pending && self.is_scheduled())
    }
}

/// A resource row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub pipeline_id: PipelineId,
    pub name: String,
    pub type_: String,
    pub source: serde_json::Value,
    pub pinned_version: Option<Version>,
    pub last_check_end_time: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    fn to_scheduler_resource(&self) -> SchedulerResource {
        SchedulerResource {
            id: self.id,
            name: self.name.clone(),
            type_: self.type_.clone(),
            source: self.source.clone(),
            pinned_version: self.pinned_version.clone(),
            last_check_end_time: self.last_check_end_time,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Lease {
    pub(crate) owner: InstanceId,
    pub(crate) expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    next_id: i64,
    next_check_order: i64,
    pub(crate) pipelines: BTreeMap<PipelineId, PipelineRecord>,
    pub(crate) jobs: BTreeMap<JobId, JobRecord>,
    pub(crate) builds: BTreeMap<BuildId, BuildRecord>,
    pub(crate) resources: BTreeMap<ResourceId, ResourceRecord>,
    pub(crate) resource_types: Vec<(PipelineId, ResourceType)>,
    pub(crate) versions: Vec<SavedVersion>,
    pub(crate) build_inputs: Vec<BuildVersion>,
    pub(crate) build_outputs: Vec<BuildVersion>,
    pub(crate) leases: HashMap<LockId, Lease>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn job(&self, id: JobId) -> DbResult<&JobRecord> {
        self.jobs
            .get(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }

    pub(crate) fn job_mut(&mut self, id: JobId) -> DbResult<&mut JobRecord> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }

    pub(crate) fn build(&self, id: BuildId) -> DbResult<&BuildRecord> {
        self.builds
            .get(&id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))
    }

    pub(crate) fn build_mut(&mut self, id: BuildId) -> DbResult<&mut BuildRecord> {
        self.builds
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))
    }

    pub(crate) fn pipeline(&self, id: PipelineId) -> DbResult<&PipelineRecord> {
        self.pipelines
            .get(&id)
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))
    }

    /// Pending builds of a job in start order.
    pub(crate) fn pending_builds(&self, job_id: JobId) -> Vec<&BuildRecord> {
        let mut pending: Vec<&BuildRecord> = self
            .builds
            .values()
            .filter(|b| b.job_id == job_id && b.status == BuildStatus::Pending)
            .collect();
        pending.sort_by_key(|b| b.queue_key());
        pending
    }

    /// Ask for another scheduling pass of every job matching `filter`.
    pub(crate) fn request_schedule_where(&mut self, filter: impl Fn(&JobRecord) -> bool) {
        let now = Utc::now();
        for job in self.jobs.values_mut() {
            if filter(job) {
                job.request_schedule(now);
            }
        }
    }

    /// Jobs of a resource's pipeline that take it as an input.
    fn request_schedule_for_resource(&mut self, resource_id: ResourceId) {
        let Some(resource) = self.resources.get(&resource_id) else {
            return;
        };
        let (pipeline_id, name) = (resource.pipeline_id, resource.name.clone());
        self.request_schedule_where(|job| job.pipeline_id == pipeline_id && job.uses_resource(&name));
    }

    /// The job, its serial group peers, and jobs with a `passed` constraint on it.
    fn request_schedule_after_build(&mut self, job_id: JobId) {
        let Some(job) = self.jobs.get(&job_id).cloned() else {
            return;
        };
        self.request_schedule_where(|other| {
            other.id == job.id
                || job.shares_serial_group(other)
                || (other.pipeline_id == job.pipeline_id && other.has_passed_from(&job.name))
        });
    }

    pub(crate) fn resources_of(&self, pipeline_id: PipelineId) -> Vec<SchedulerResource> {
        self.resources
            .values()
            .filter(|r| r.pipeline_id == pipeline_id)
            .map(ResourceRecord::to_scheduler_resource)
            .collect()
    }

    fn insert_build(
        &mut self,
        job_id: JobId,
        manually_triggered: bool,
        rerun_of: BuildId,
    ) -> DbResult<BuildId> {
        let id = BuildId::new(self.next_id());

        let name = if rerun_of.is_none() {
            let job = self.job_mut(job_id)?;
            job.next_build_number += 1;
            job.next_build_number.to_string()
        } else {
            let original = self.build_mut(rerun_of)?;
            original.rerun_number += 1;
            format!("{}.{}", original.name, original.rerun_number)
        };

        self.builds.insert(
            id,
            BuildRecord {
                id,
                job_id,
                name,
                status: BuildStatus::Pending,
                claimed_by: None,
                aborted: false,
                manually_triggered,
                rerun_of,
                rerun_number: 0,
                create_time: Utc::now(),
                inputs: Vec::new(),
                plan: None,
            },
        );
        self.job_mut(job_id)?.request_schedule(Utc::now());
        Ok(id)
    }

    pub(crate) fn ensure_pending_build(&mut self, job_id: JobId) -> DbResult<Option<BuildId>> {
        if !self.pending_builds(job_id).is_empty() {
            return Ok(None);
        }
        self.insert_build(job_id, false, BuildId::NONE).map(Some)
    }

    /// Claim a pending build for `owner`. See [`tempo_core::Job::schedule_build`].
    pub(crate) fn schedule_build(&mut self, build_id: BuildId, owner: InstanceId) -> DbResult<bool> {
        let build = self.build(build_id)?;
        if build.status != BuildStatus::Pending {
            return Ok(false);
        }
        if let Some(claimed_by) = build.claimed_by {
            if claimed_by != owner {
                debug!(build = %build_id, %claimed_by, "Claim refused: claimed by another instance");
            }
            return Ok(claimed_by == owner);
        }

        let job = self.job(build.job_id)?;
        let pipeline = self.pipeline(job.pipeline_id)?;
        if job.paused || pipeline.paused {
            debug!(build = %build_id, "Claim refused: paused");
            return Ok(false);
        }

        let job_id = job.id;
        let reached = self.max_in_flight_reached(job, build_id);
        self.job_mut(job_id)?.max_in_flight_reached = reached;
        if reached {
            return Ok(false);
        }

        self.build_mut(build_id)?.claimed_by = Some(owner);
        Ok(true)
    }

    /// Jobs sharing a serial group with `job`. A job without groups is its
    /// own group.
    fn serial_group(&self, job: &JobRecord) -> Vec<JobId> {
        if job.config.serial_groups.is_empty() {
            return vec![job.id];
        }
        self.jobs
            .values()
            .filter(|other| job.shares_serial_group(other))
            .map(|other| other.id)
            .collect()
    }

    /// Whether `build_id` has to wait for its serial group.
    ///
    /// Under a limit, a build may only be claimed while the group runs fewer
    /// builds than the limit and it is the group's next pending build. The
    /// queue spans pending builds of unpaused jobs whose inputs are
    /// determined, ordered with reruns right after their original.
    fn max_in_flight_reached(&self, job: &JobRecord, build_id: BuildId) -> bool {
        let limit = job.config.effective_max_in_flight();
        if limit == 0 {
            return false;
        }

        let group = self.serial_group(job);
        let running = self
            .builds
            .values()
            .filter(|b| group.contains(&b.job_id) && b.occupies_slot())
            .count();
        if running >= limit as usize {
            debug!(build = %build_id, running, limit, "Claim refused: max in flight reached");
            return true;
        }

        let next = self
            .builds
            .values()
            .filter(|b| group.contains(&b.job_id) && b.status == BuildStatus::Pending && !b.aborted)
            .filter(|b| {
                self.jobs
                    .get(&b.job_id)
                    .is_some_and(|j| !j.paused && j.inputs_determined())
            })
            .min_by_key(|b| b.queue_key());

        match next {
            Some(next) if next.id == build_id => false,
            next => {
                debug!(
                    build = %build_id,
                    next = ?next.map(|b| b.id),
                    "Claim refused: not next in serial group"
                );
                true
            }
        }
    }

    fn record_build_inputs(&mut self, build_id: BuildId, inputs: &[BuildInput]) -> DbResult<()> {
        let build = self.build_mut(build_id)?;
        build.inputs = inputs.to_vec();
        let job_id = build.job_id;

        self.build_inputs.retain(|record| record.build_id != build_id);
        self.build_inputs
            .extend(inputs.iter().map(|input| BuildVersion {
                build_id,
                job_id,
                name: input.name.clone(),
                resource_id: input.resource_id,
                version: input.version.clone(),
                succeeded: false,
            }));
        Ok(())
    }

    pub(crate) fn adopt_inputs(&mut self, build_id: BuildId) -> DbResult<Option<Vec<BuildInput>>> {
        let job = self.job(self.build(build_id)?.job_id)?;
        let Some((mapping, true)) = &job.next_inputs else {
            return Ok(None);
        };

        let inputs: Vec<BuildInput> = mapping
            .iter()
            .filter_map(|(name, result)| {
                result.resolved().map(|input| BuildInput {
                    name: name.clone(),
                    resource_id: input.resource_id,
                    version: input.version.clone(),
                    first_occurrence: input.first_occurrence,
                })
            })
            .collect();

        self.record_build_inputs(build_id, &inputs)?;
        Ok(Some(inputs))
    }

    pub(crate) fn adopt_rerun_inputs(
        &mut self,
        build_id: BuildId,
    ) -> DbResult<Option<Vec<BuildInput>>> {
        let original_id = self.build(build_id)?.rerun_of;
        let original = self.build(original_id)?;
        if original.inputs.is_empty() {
            return Ok(None);
        }

        let inputs: Vec<BuildInput> = original
            .inputs
            .iter()
            .map(|input| BuildInput {
                first_occurrence: false,
                ..input.clone()
            })
            .collect();

        self.record_build_inputs(build_id, &inputs)?;
        Ok(Some(inputs))
    }

    /// Move a build to `status`. Builds that already finished are left alone.
    pub(crate) fn finish_build(&mut self, build_id: BuildId, status: BuildStatus) -> DbResult<()> {
        let build = self.build_mut(build_id)?;
        if build.status.is_terminal() {
            debug!(build = %build_id, status = %build.status, "Build already finished");
            return Ok(());
        }
        build.status = status;
        let job_id = build.job_id;
        self.request_schedule_after_build(job_id);

        if status == BuildStatus::Succeeded {
            for record in self
                .build_inputs
                .iter_mut()
                .chain(self.build_outputs.iter_mut())
                .filter(|r| r.build_id == build_id)
            {
                record.succeeded = true;
            }
        }
        Ok(())
    }
}

/// Shared in-memory database.
///
/// Cloning is cheap and shares state. Each store carries the [`InstanceId`]
/// that owns the locks it acquires; use [`MemoryStore::with_owner`] to act as
/// another scheduler instance against the same state.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    owner: InstanceId,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            owner: InstanceId::new(),
        }
    }

    /// A handle on the same state that acquires locks as `owner`.
    pub fn with_owner(&self, owner: InstanceId) -> Self {
        Self {
            state: Arc::clone(&self.state),
            owner,
        }
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Pipelines

    pub fn add_pipeline(&self, name: impl Into<String>) -> PipelineId {
        let mut state = self.lock();
        let id = PipelineId::new(state.next_id());
        state.pipelines.insert(
            id,
            PipelineRecord {
                id,
                name: name.into(),
                paused: false,
            },
        );
        id
    }

    /// Load a pipeline handle.
    pub fn pipeline(&self, id: PipelineId) -> DbResult<Arc<MemoryPipeline>> {
        let name = self.lock().pipeline(id)?.name.clone();
        Ok(Arc::new(MemoryPipeline::new(self.clone(), id, name)))
    }

    pub fn set_pipeline_paused(&self, id: PipelineId, paused: bool) -> DbResult<()> {
        let mut state = self.lock();
        state
            .pipelines
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))?
            .paused = paused;
        state.request_schedule_where(|job| job.pipeline_id == id);
        Ok(())
    }

    /// Delete a pipeline and everything in it.
    pub fn delete_pipeline(&self, id: PipelineId) -> DbResult<()> {
        let mut state = self.lock();
        state
            .pipelines
            .remove(&id)
            .ok_or_else(|| DbError::NotFound(format!("pipeline {}", id)))?;

        let job_ids: Vec<JobId> = state
            .jobs
            .values()
            .filter(|j| j.pipeline_id == id)
            .map(|j| j.id)
            .collect();
        state.jobs.retain(|_, j| j.pipeline_id != id);
        state.builds.retain(|_, b| !job_ids.contains(&b.job_id));
        state.resources.retain(|_, r| r.pipeline_id != id);
        state.resource_types.retain(|(pipeline_id, _)| *pipeline_id != id);
        Ok(())
    }

    // Resources

    pub fn add_resource(
        &self,
        pipeline_id: PipelineId,
        name: impl Into<String>,
        type_: impl Into<String>,
    ) -> DbResult<ResourceId> {
        let mut state = self.lock();
        state.pipeline(pipeline_id)?;

        let name = name.into();
        if state
            .resources
            .values()
            .any(|r| r.pipeline_id == pipeline_id && r.name == name)
        {
            return Err(DbError::Duplicate(format!("resource {}", name)));
        }

        let id = ResourceId::new(state.next_id());
        state.resources.insert(
            id,
            ResourceRecord {
                id,
                pipeline_id,
                name,
                type_: type_.into(),
                source: serde_json::Value::Object(Default::default()),
                pinned_version: None,
                last_check_end_time: None,
            },
        );
        Ok(id)
    }

    pub fn add_resource_type(&self, pipeline_id: PipelineId, resource_type: ResourceType) -> DbResult<()> {
        let mut state = self.lock();
        state.pipeline(pipeline_id)?;
        state.resource_types.push((pipeline_id, resource_type));
        Ok(())
    }

    /// Save a version discovered by checking. Later saves are newer.
    pub fn save_version(&self, resource_id: ResourceId, version: Version) -> DbResult<()> {
        let mut state = self.lock();
        if !state.resources.contains_key(&resource_id) {
            return Err(DbError::NotFound(format!("resource {}", resource_id)));
        }
        if state
            .versions
            .iter()
            .any(|v| v.resource_id == resource_id && v.version == version)
        {
            return Ok(());
        }

        state.next_check_order += 1;
        let check_order = state.next_check_order;
        state.versions.push(SavedVersion {
            resource_id,
            version,
            check_order,
            disabled: false,
        });
        state.request_schedule_for_resource(resource_id);
        Ok(())
    }

    /// Record that checking of a resource finished at `at`.
    pub fn set_last_checked(&self, resource_id: ResourceId, at: DateTime<Utc>) -> DbResult<()> {
        self.update_resource(resource_id, |r| r.last_check_end_time = Some(at))
    }

    pub fn pin_resource(&self, resource_id: ResourceId, version: Option<Version>) -> DbResult<()> {
        self.update_resource(resource_id, |r| r.pinned_version = version)
    }

    fn update_resource(
        &self,
        resource_id: ResourceId,
        update: impl FnOnce(&mut ResourceRecord),
    ) -> DbResult<()> {
        let mut state = self.lock();
        let resource = state
            .resources
            .get_mut(&resource_id)
            .ok_or_else(|| DbError::NotFound(format!("resource {}", resource_id)))?;
        update(resource);
        state.request_schedule_for_resource(resource_id);
        Ok(())
    }

    // Jobs

    pub fn add_job(&self, pipeline_id: PipelineId, config: JobConfig) -> DbResult<JobId> {
        let mut state = self.lock();
        state.pipeline(pipeline_id)?;
        if state
            .jobs
            .values()
            .any(|j| j.pipeline_id == pipeline_id && j.name == config.name)
        {
            return Err(DbError::Duplicate(format!("job {}", config.name)));
        }

        let id = JobId::new(state.next_id());
        state.jobs.insert(
            id,
            JobRecord {
                id,
                pipeline_id,
                name: config.name.clone(),
                config,
                paused: false,
                has_new_inputs: false,
                next_inputs: None,
                schedule_requested: Utc::now(),
                last_scheduled: DateTime::<Utc>::MIN_UTC,
                max_in_flight_reached: false,
                next_build_number: 0,
                mapping_saves: 0,
                has_new_inputs_updates: 0,
            },
        );
        Ok(id)
    }

    pub fn job_record(&self, id: JobId) -> DbResult<JobRecord> {
        self.lock().job(id).cloned()
    }

    pub fn set_job_paused(&self, id: JobId, paused: bool) -> DbResult<()> {
        let mut state = self.lock();
        let job = state.job_mut(id)?;
        job.paused = paused;
        job.request_schedule(Utc::now());
        Ok(())
    }

    pub fn update_job_config(&self, id: JobId, config: JobConfig) -> DbResult<()> {
        let mut state = self.lock();
        let job = state.job_mut(id)?;
        job.config = config;
        job.request_schedule(Utc::now());
        Ok(())
    }

    pub fn delete_job(&self, id: JobId) -> DbResult<()> {
        let mut state = self.lock();
        state
            .jobs
            .remove(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        state.builds.retain(|_, b| b.job_id != id);
        Ok(())
    }

    // Builds

    /// Create a pending build, as the scheduler would.
    pub fn create_build(&self, job_id: JobId) -> DbResult<BuildId> {
        self.lock().insert_build(job_id, false, BuildId::NONE)
    }

    /// Create a pending build on a user's request.
    pub fn create_manual_build(&self, job_id: JobId) -> DbResult<BuildId> {
        self.lock().insert_build(job_id, true, BuildId::NONE)
    }

    /// Create a pending rerun of a finished build.
    pub fn create_rerun(&self, original: BuildId) -> DbResult<BuildId> {
        let mut state = self.lock();
        let job_id = state.build(original)?.job_id;
        state.insert_build(job_id, false, original)
    }

    /// Request abort of a build. Pending builds stay pending until the
    /// scheduler finishes them.
    pub fn abort_build(&self, id: BuildId) -> DbResult<()> {
        let mut state = self.lock();
        let build = state.build_mut(id)?;
        build.aborted = true;
        let job_id = build.job_id;
        state.job_mut(job_id)?.request_schedule(Utc::now());
        Ok(())
    }

    /// Record a completed build with the given inputs and outputs.
    pub fn complete_build(
        &self,
        id: BuildId,
        status: BuildStatus,
        inputs: Vec<BuildInput>,
        outputs: Vec<(String, ResourceId, Version)>,
    ) -> DbResult<()> {
        let mut state = self.lock();
        let job_id = state.build(id)?.job_id;
        state.record_build_inputs(id, &inputs)?;
        state.build_outputs.retain(|r| r.build_id != id);
        state
            .build_outputs
            .extend(outputs.into_iter().map(|(name, resource_id, version)| BuildVersion {
                build_id: id,
                job_id,
                name,
                resource_id,
                version,
                succeeded: false,
            }));
        state.finish_build(id, status)
    }

    pub fn build_record(&self, id: BuildId) -> DbResult<BuildRecord> {
        self.lock().build(id).cloned()
    }

    /// Every build of a job, oldest first.
    pub fn builds_of(&self, job_id: JobId) -> Vec<BuildRecord> {
        self.lock()
            .builds
            .values()
            .filter(|b| b.job_id == job_id)
            .cloned()
            .collect()
    }

    // Locks

    /// Whether a live lease exists for `id`.
    pub fn is_locked(&self, id: LockId) -> bool {
        self.lock()
            .leases
            .get(&id)
            .is_some_and(|lease| lease.expires_at > Utc::now())
    }
}
