//! Builds and the build storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use crate::resource::SchedulerResource;
use crate::versions::Version;
use crate::{BuildId, JobId, ResourceId, Result};

/// Lifecycle status of a build.
///
/// A pending build that has been claimed for starting stays `Pending` with
/// its scheduled mark set until it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    #[display("pending")]
    Pending,
    #[display("started")]
    Started,
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
    #[display("errored")]
    Errored,
    #[display("aborted")]
    Aborted,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Succeeded
                | BuildStatus::Failed
                | BuildStatus::Errored
                | BuildStatus::Aborted
        )
    }
}

/// A resolved input handed to a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInput {
    pub name: String,
    pub resource_id: ResourceId,
    pub version: Version,
    pub first_occurrence: bool,
}

/// Storage interface for a build.
#[async_trait]
pub trait Build: Send + Sync {
    fn id(&self) -> BuildId;

    fn name(&self) -> &str;

    fn job_id(&self) -> JobId;

    fn status(&self) -> BuildStatus;

    fn is_aborted(&self) -> bool;

    fn is_manually_triggered(&self) -> bool;

    /// The build this one reruns, or [`BuildId::NONE`].
    fn rerun_of(&self) -> BuildId;

    /// Whether the build has been claimed for starting.
    fn is_scheduled(&self) -> bool;

    fn create_time(&self) -> DateTime<Utc>;

    /// Whether this build was created at or after the last check of `resource`.
    ///
    /// A build created in the same instant as the check finished is treated
    /// as not yet covered by it.
    fn is_newer_than_last_check_of(&self, resource: &SchedulerResource) -> bool {
        match resource.last_check_end_time {
            Some(checked) => self.create_time() >= checked,
            None => true,
        }
    }

    /// Move the build to a terminal status.
    ///
    /// Builds that already finished, or that another instance claimed and
    /// started, are left as they are.
    async fn finish(&self, status: BuildStatus) -> Result<()>;

    /// Record the plan and move the build to `Started`.
    /// Returns false if the build can no longer be started.
    async fn start(&self, plan: &Plan) -> Result<bool>;

    /// Copy the job's saved next inputs onto this build.
    /// Returns `None` if the job's inputs are not resolved.
    async fn adopt_inputs_and_pipes(&self) -> Result<Option<Vec<BuildInput>>>;

    /// Copy the inputs of the build being rerun onto this build.
    /// Returns `None` if that build has no recorded inputs.
    async fn adopt_rerun_inputs_and_pipes(&self) -> Result<Option<Vec<BuildInput>>>;
}
