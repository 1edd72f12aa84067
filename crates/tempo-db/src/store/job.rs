//! Job handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempo_core::{
    Build, InputMapping, Job, JobConfig, JobId, Lock, LockId, PipelineId, Result,
};
use tracing::debug;

use crate::store::{JobRecord, MemoryBuild, MemoryLock, MemoryStore, PipelineRecord};

/// Job state as of the last load.
#[derive(Debug, Clone)]
struct Snapshot {
    config: JobConfig,
    paused: bool,
    has_new_inputs: bool,
    schedule_requested: DateTime<Utc>,
    last_scheduled: DateTime<Utc>,
    max_in_flight_reached: bool,
}

impl From<&JobRecord> for Snapshot {
    fn from(record: &JobRecord) -> Self {
        Self {
            config: record.config.clone(),
            paused: record.paused,
            has_new_inputs: record.has_new_inputs,
            schedule_requested: record.schedule_requested,
            last_scheduled: record.last_scheduled,
            max_in_flight_reached: record.max_in_flight_reached,
        }
    }
}

/// A job loaded from a [`MemoryStore`].
pub struct MemoryJob {
    store: MemoryStore,
    id: JobId,
    name: String,
    pipeline_id: PipelineId,
    pipeline_name: String,
    snapshot: Mutex<Snapshot>,
}

impl MemoryJob {
    pub(crate) fn new(store: MemoryStore, record: &JobRecord, pipeline: &PipelineRecord) -> Self {
        Self {
            store,
            id: record.id,
            name: record.name.clone(),
            pipeline_id: pipeline.id,
            pipeline_name: pipeline.name.clone(),
            snapshot: Mutex::new(Snapshot::from(record)),
        }
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Job for MemoryJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    fn config(&self) -> JobConfig {
        self.snapshot().config
    }

    fn paused(&self) -> bool {
        self.snapshot().paused
    }

    fn has_new_inputs(&self) -> bool {
        self.snapshot().has_new_inputs
    }

    fn schedule_requested_time(&self) -> DateTime<Utc> {
        self.snapshot().schedule_requested
    }

    fn last_scheduled(&self) -> DateTime<Utc> {
        self.snapshot().last_scheduled
    }

    fn max_in_flight_reached(&self) -> bool {
        self.snapshot().max_in_flight_reached
    }

    async fn reload(&self) -> Result<bool> {
        let fresh = match self.store.lock().jobs.get(&self.id) {
            Some(record) => Snapshot::from(record),
            None => return Ok(false),
        };
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(true)
    }

    async fn acquire_scheduling_lock(&self, ttl: Duration) -> Result<Option<Box<dyn Lock>>> {
        let lock = MemoryLock::try_acquire(&self.store, LockId::JobScheduling(self.id), ttl)?;
        Ok(lock.map(|lock| Box::new(lock) as Box<dyn Lock>))
    }

    async fn schedule_build(&self, build: &dyn Build) -> Result<bool> {
        Ok(self
            .store
            .lock()
            .schedule_build(build.id(), self.store.owner())?)
    }

    async fn get_pending_builds(&self) -> Result<Vec<Arc<dyn Build>>> {
        let state = self.store.lock();
        state.job(self.id)?;
        Ok(state
            .pending_builds(self.id)
            .into_iter()
            .map(|b| Arc::new(MemoryBuild::new(self.store.clone(), b)) as Arc<dyn Build>)
            .collect())
    }

    async fn ensure_pending_build_exists(&self) -> Result<()> {
        if let Some(build) = self.store.lock().ensure_pending_build(self.id)? {
            debug!(job = %self.name, build = %build, "Created pending build");
        }
        Ok(())
    }

    async fn save_next_input_mapping(&self, mapping: &InputMapping, resolved: bool) -> Result<()> {
        let mut state = self.store.lock();
        let job = state.job_mut(self.id)?;
        job.next_inputs = Some((mapping.clone(), resolved));
        job.mapping_saves += 1;
        Ok(())
    }

    async fn set_has_new_inputs(&self, has_new_inputs: bool) -> Result<()> {
        {
            let mut state = self.store.lock();
            let job = state.job_mut(self.id)?;
            job.has_new_inputs = has_new_inputs;
            job.has_new_inputs_updates += 1;
        }
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_new_inputs = has_new_inputs;
        Ok(())
    }

    async fn request_schedule(&self) -> Result<()> {
        self.store.lock().job_mut(self.id)?.request_schedule(Utc::now());
        Ok(())
    }

    async fn update_last_scheduled(&self, requested: DateTime<Utc>) -> Result<()> {
        self.store.lock().job_mut(self.id)?.last_scheduled = requested;
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_scheduled = requested;
        Ok(())
    }
}
