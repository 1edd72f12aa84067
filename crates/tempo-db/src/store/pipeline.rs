//! Pipeline handle.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tempo_core::versions::BuildVersion;
use tempo_core::{
    Build, Job, JobId, Pipeline, PipelineId, ResourceType, Resources, Result, VersionsDb,
};

use crate::store::{MemoryBuild, MemoryJob, MemoryStore};

/// A pipeline loaded from a [`MemoryStore`].
pub struct MemoryPipeline {
    store: MemoryStore,
    id: PipelineId,
    name: String,
}

impl MemoryPipeline {
    pub(crate) fn new(store: MemoryStore, id: PipelineId, name: String) -> Self {
        Self { store, id, name }
    }
}

#[async_trait]
impl Pipeline for MemoryPipeline {
    fn id(&self) -> PipelineId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn reload(&self) -> Result<bool> {
        Ok(self.store.lock().pipelines.contains_key(&self.id))
    }

    async fn check_paused(&self) -> Result<bool> {
        Ok(self.store.lock().pipeline(self.id)?.paused)
    }

    async fn load_versions_db(&self) -> Result<Arc<VersionsDb>> {
        let state = self.store.lock();
        state.pipeline(self.id)?;

        let jobs: HashMap<JobId, &str> = state
            .jobs
            .values()
            .filter(|j| j.pipeline_id == self.id)
            .map(|j| (j.id, j.name.as_str()))
            .collect();
        let in_pipeline = |record: &&BuildVersion| jobs.contains_key(&record.job_id);

        let mut db = VersionsDb::new();
        for (id, name) in &jobs {
            db = db.with_job(*name, *id);
        }
        for version in state.versions.iter().filter(|v| {
            state
                .resources
                .get(&v.resource_id)
                .is_some_and(|r| r.pipeline_id == self.id)
        }) {
            db = db.with_version(version.clone());
        }
        for input in state.build_inputs.iter().filter(in_pipeline) {
            db = db.with_build_input(input.clone());
        }
        for output in state.build_outputs.iter().filter(in_pipeline) {
            db = db.with_build_output(output.clone());
        }

        Ok(Arc::new(db))
    }

    async fn jobs(&self) -> Result<Vec<Arc<dyn Job>>> {
        let state = self.store.lock();
        let pipeline = state.pipeline(self.id)?;

        Ok(state
            .jobs
            .values()
            .filter(|j| j.pipeline_id == self.id)
            .map(|j| {
                Arc::new(MemoryJob::new(self.store.clone(), j, pipeline)) as Arc<dyn Job>
            })
            .collect())
    }

    async fn resources(&self) -> Result<Resources> {
        let state = self.store.lock();
        state.pipeline(self.id)?;
        Ok(Resources::new(state.resources_of(self.id)))
    }

    async fn resource_types(&self) -> Result<Vec<ResourceType>> {
        let state = self.store.lock();
        state.pipeline(self.id)?;
        Ok(state
            .resource_types
            .iter()
            .filter(|(pipeline_id, _)| *pipeline_id == self.id)
            .map(|(_, resource_type)| resource_type.clone())
            .collect())
    }

    async fn pending_builds(&self) -> Result<HashMap<JobId, Vec<Arc<dyn Build>>>> {
        let state = self.store.lock();
        state.pipeline(self.id)?;

        Ok(state
            .jobs
            .values()
            .filter(|j| j.pipeline_id == self.id)
            .map(|j| {
                let builds = state
                    .pending_builds(j.id)
                    .into_iter()
                    .map(|b| Arc::new(MemoryBuild::new(self.store.clone(), b)) as Arc<dyn Build>)
                    .collect();
                (j.id, builds)
            })
            .collect())
    }
}
