//! Pipeline storage interface.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::build::Build;
use crate::job::Job;
use crate::resource::{ResourceType, Resources};
use crate::versions::VersionsDb;
use crate::{JobId, PipelineId, Result};

/// A pipeline: a set of jobs and the resources they consume.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn id(&self) -> PipelineId;

    fn name(&self) -> &str;

    /// Refresh state. Returns false if the pipeline has been deleted.
    async fn reload(&self) -> Result<bool>;

    async fn check_paused(&self) -> Result<bool>;

    /// Snapshot versions, build inputs and build outputs.
    async fn load_versions_db(&self) -> Result<Arc<VersionsDb>>;

    async fn jobs(&self) -> Result<Vec<Arc<dyn Job>>>;

    async fn resources(&self) -> Result<Resources>;

    async fn resource_types(&self) -> Result<Vec<ResourceType>>;

    /// Pending builds of every job, each list in start order.
    async fn pending_builds(&self) -> Result<HashMap<JobId, Vec<Arc<dyn Build>>>>;
}
