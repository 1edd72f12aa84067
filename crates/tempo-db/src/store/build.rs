//! Build handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_core::{Build, BuildId, BuildInput, BuildStatus, JobId, Plan, Result};
use tracing::debug;

use crate::store::{BuildRecord, MemoryStore};

/// A build loaded from a [`MemoryStore`].
///
/// Getters reflect the row at load time; writes go straight to the store.
pub struct MemoryBuild {
    store: MemoryStore,
    record: BuildRecord,
}

impl MemoryBuild {
    pub(crate) fn new(store: MemoryStore, record: &BuildRecord) -> Self {
        Self {
            store,
            record: record.clone(),
        }
    }
}

#[async_trait]
impl Build for MemoryBuild {
    fn id(&self) -> BuildId {
        self.record.id
    }

    fn name(&self) -> &str {
        &self.record.name
    }

    fn job_id(&self) -> JobId {
        self.record.job_id
    }

    fn status(&self) -> BuildStatus {
        self.record.status
    }

    fn is_aborted(&self) -> bool {
        self.record.aborted
    }

    fn is_manually_triggered(&self) -> bool {
        self.record.manually_triggered
    }

    fn rerun_of(&self) -> BuildId {
        self.record.rerun_of
    }

    fn is_scheduled(&self) -> bool {
        self.record.is_scheduled()
    }

    fn create_time(&self) -> DateTime<Utc> {
        self.record.create_time
    }

    async fn finish(&self, status: BuildStatus) -> Result<()> {
        let mut state = self.store.lock();
        let build = state.build(self.record.id)?;
        let owner = self.store.owner();
        if build.status == BuildStatus::Started
            && build.claimed_by.is_some_and(|claimed_by| claimed_by != owner)
        {
            debug!(build = %build.id, %status, "Build started by another instance");
            return Ok(());
        }
        Ok(state.finish_build(self.record.id, status)?)
    }

    async fn start(&self, plan: &Plan) -> Result<bool> {
        let mut state = self.store.lock();
        let build = state.build_mut(self.record.id)?;
        if build.status != BuildStatus::Pending || build.aborted {
            return Ok(false);
        }

        build.status = BuildStatus::Started;
        build.plan = Some(plan.clone());
        Ok(true)
    }

    async fn adopt_inputs_and_pipes(&self) -> Result<Option<Vec<BuildInput>>> {
        Ok(self.store.lock().adopt_inputs(self.record.id)?)
    }

    async fn adopt_rerun_inputs_and_pipes(&self) -> Result<Option<Vec<BuildInput>>> {
        Ok(self.store.lock().adopt_rerun_inputs(self.record.id)?)
    }
}
