//! Input resolution interfaces.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::job::Job;
use crate::resource::Resources;
use crate::versions::{InputMapping, VersionsDb};
use crate::{JobId, Result};

/// Job name to id for the jobs of a pipeline, used by `passed` constraints.
pub type RelatedJobs = HashMap<String, JobId>;

/// The result of computing a job's next inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputComputation {
    pub mapping: InputMapping,
    /// Every input has a version.
    pub resolved: bool,
    /// More candidate mappings remain to be explored.
    pub has_next: bool,
}

/// Computes a job's next inputs from its own versions source. No side effects.
#[async_trait]
pub trait Algorithm: Send + Sync {
    async fn compute(
        &self,
        job: &dyn Job,
        resources: &Resources,
        related_jobs: &RelatedJobs,
    ) -> Result<InputComputation>;
}

/// Resolves a job's next inputs against a shared snapshot and persists the
/// mapping. Returns the whole computation so callers can act on `has_next`.
#[async_trait]
pub trait InputMapper: Send + Sync {
    async fn save_next_input_mapping(
        &self,
        versions: &VersionsDb,
        job: &dyn Job,
        resources: &Resources,
    ) -> Result<InputComputation>;
}
